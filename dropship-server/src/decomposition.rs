//! Sub-order decomposition
//!
//! A paid order is split into one dropship order per supplier. A line item is
//! eligible when its product is flagged for dropship and an active mapping
//! points at an active supplier whose product can cover the quantity. The
//! first such mapping (lowest id) wins. Ineligible items stay on the parent
//! for regular fulfillment.

use crate::core::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::storage::{EngineStorage, StorageError};
use serde::Serialize;
use shared::models::{
    AuditNote, DropshipOrder, DropshipOrderItem, DropshipStatus, Order, OrderItem, OrderStatus,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize)]
pub struct Decomposition {
    pub order_id: i64,
    pub dropship_orders: Vec<DropshipOrder>,
    /// Order item ids left for non-dropship fulfillment
    pub retained_items: Vec<i64>,
}

#[derive(Clone)]
pub struct Decomposer {
    storage: EngineStorage,
    events: EventBus,
}

impl Decomposer {
    pub fn new(storage: EngineStorage, events: EventBus) -> Self {
        Self { storage, events }
    }

    pub fn decompose(&self, order_id: i64) -> EngineResult<Decomposition> {
        let order = self
            .storage
            .get_order(order_id)?
            .ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))?;

        if order.status.is_cancelled() {
            return Err(EngineError::OrderCancelled(order_id));
        }
        if order.status == OrderStatus::Pending {
            return Err(EngineError::Validation(format!("order {order_id} is not paid")));
        }
        if !self.storage.dropship_orders_for_order(order_id)?.is_empty() {
            return Err(EngineError::AlreadyDecomposed(order_id));
        }

        let mut supplier_active = HashMap::new();
        let mut groups: BTreeMap<i64, Vec<DropshipOrderItem>> = BTreeMap::new();
        let mut retained_items = Vec::new();
        for item in &order.items {
            match self.eligible_item(item, &mut supplier_active)? {
                Some((supplier_id, dropship_item)) => {
                    groups.entry(supplier_id).or_default().push(dropship_item)
                }
                None => retained_items.push(item.id),
            }
        }
        if groups.is_empty() {
            return Err(EngineError::NotEligible(order_id));
        }

        let now = shared::util::now_millis();
        let drafts = groups
            .into_iter()
            .map(|(supplier_id, items)| draft(&order, supplier_id, items, now))
            .collect();

        let (created, previous) = self
            .storage
            .create_dropship_orders(order_id, drafts, now)
            .map_err(|e| match e {
                StorageError::AlreadyDecomposed(id) => EngineError::AlreadyDecomposed(id),
                other => other.into(),
            })?;

        tracing::info!(
            order_id,
            dropship_orders = created.len(),
            retained = retained_items.len(),
            "Order decomposed"
        );
        for d in &created {
            self.events.emit(EngineEvent::DropshipCreated {
                dropship_order_id: d.id,
                order_id,
                supplier_id: d.supplier_id,
            });
        }
        if previous != OrderStatus::Processing {
            self.events.emit(EngineEvent::OrderStatusChanged {
                order_id,
                from: previous,
                to: OrderStatus::Processing,
                fulfillment: order.fulfillment_status,
            });
        }

        Ok(Decomposition {
            order_id,
            dropship_orders: created,
            retained_items,
        })
    }

    fn eligible_item(
        &self,
        item: &OrderItem,
        supplier_active: &mut HashMap<i64, bool>,
    ) -> EngineResult<Option<(i64, DropshipOrderItem)>> {
        let Some(product) = self.storage.get_product(item.product_id)? else {
            return Ok(None);
        };
        if !product.is_dropship {
            return Ok(None);
        }

        for mapping in self.storage.active_mappings_for_product(product.id)? {
            let Some(sp) = self.storage.get_supplier_product(mapping.supplier_product_id)? else {
                continue;
            };
            if !sp.can_fulfill(item.quantity) {
                continue;
            }
            let active = match supplier_active.get(&sp.supplier_id) {
                Some(active) => *active,
                None => {
                    let active = self
                        .storage
                        .get_supplier(sp.supplier_id)?
                        .is_some_and(|s| s.is_active());
                    supplier_active.insert(sp.supplier_id, active);
                    active
                }
            };
            if !active {
                continue;
            }
            return Ok(Some((
                sp.supplier_id,
                DropshipOrderItem {
                    order_item_id: item.id,
                    product_id: product.id,
                    product_name: item.product_name.clone(),
                    supplier_product_id: sp.id,
                    supplier_sku: sp.supplier_sku,
                    quantity: item.quantity,
                    unit_supplier_cost: sp.price,
                },
            )));
        }
        Ok(None)
    }
}

fn draft(order: &Order, supplier_id: i64, items: Vec<DropshipOrderItem>, now: i64) -> DropshipOrder {
    let total_cost = items
        .iter()
        .map(|i| i.quantity * i.unit_supplier_cost)
        .sum();
    DropshipOrder {
        id: 0,
        order_id: order.id,
        supplier_id,
        status: DropshipStatus::Pending,
        retry_count: 0,
        supplier_order_id: None,
        tracking_number: None,
        carrier: None,
        estimated_delivery: None,
        customer: order.customer.clone(),
        shipping_address: order.shipping_address.clone(),
        currency: order.currency.clone(),
        notes: vec![AuditNote {
            at: now,
            message: format!(
                "Created from order {} with {} item(s)",
                order.order_number,
                items.len()
            ),
        }],
        items,
        total_cost,
        failure_reason: None,
        sent_to_supplier_at: None,
        confirmed_at: None,
        shipped_at: None,
        delivered_at: None,
        cancelled_at: None,
        created_at: now,
        updated_at: now,
    }
}
