//! Pre-flight validation run before every retry

use crate::core::error::{EngineError, EngineResult, StockShortage};
use shared::models::{DropshipOrder, Order, SupplierProduct};
use std::collections::HashMap;

/// Every item's supplier product must be active and hold enough stock.
/// Returns the itemized shortages; empty means the order can be filled.
pub fn stock_shortages(
    order: &DropshipOrder,
    supplier_products: &HashMap<i64, SupplierProduct>,
) -> Vec<StockShortage> {
    order
        .items
        .iter()
        .filter_map(|item| match supplier_products.get(&item.supplier_product_id) {
            Some(sp) if sp.can_fulfill(item.quantity) => None,
            Some(sp) => Some(StockShortage {
                sku: item.supplier_sku.clone(),
                requested: item.quantity,
                available: sp.stock_quantity,
                inactive: !sp.is_active,
            }),
            None => Some(StockShortage {
                sku: item.supplier_sku.clone(),
                requested: item.quantity,
                available: 0,
                inactive: true,
            }),
        })
        .collect()
}

/// Structural checks on the dropship order and its parent
pub fn check_integrity(order: &DropshipOrder, parent: Option<&Order>) -> EngineResult<()> {
    let mut problems = Vec::new();
    if order.items.is_empty() {
        problems.push("no items".to_string());
    }
    if order.total_cost <= 0 {
        problems.push(format!("total cost {}", order.total_cost));
    }
    if order.shipping_address.is_none() {
        problems.push("missing shipping address".to_string());
    }
    match parent {
        None => problems.push(format!("parent order {} missing", order.order_id)),
        Some(parent) if parent.status.is_cancelled() => {
            problems.push(format!("parent order is {}", parent.status));
        }
        Some(_) => {}
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation(problems.join("; ")))
    }
}
