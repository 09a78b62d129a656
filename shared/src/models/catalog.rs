//! Catalog Model (retail products, supplier products, mappings)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Retail product entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// Retail price in minor units
    pub price: i64,
    pub stock: i64,
    /// Virtual products carry no physical stock
    #[serde(default)]
    pub is_virtual: bool,
    /// Eligible for dropship fulfillment
    #[serde(default)]
    pub is_dropship: bool,
    pub updated_at: i64,
}

/// Supplier product sync state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    PendingSync,
    SyncFailed,
    OutOfSync,
    SupplierDiscontinued,
}

/// Supplier product, unique per (supplier_id, supplier_sku)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierProduct {
    pub id: i64,
    pub supplier_id: i64,
    pub supplier_sku: String,
    pub name: String,
    /// Supplier cost in minor units
    pub price: i64,
    pub stock_quantity: i64,
    pub sync_status: SyncStatus,
    pub is_active: bool,
    #[serde(default)]
    pub last_synced_at: Option<i64>,
    pub updated_at: i64,
}

impl SupplierProduct {
    pub fn can_fulfill(&self, quantity: i64) -> bool {
        self.is_active && self.stock_quantity >= quantity
    }
}

/// Retail price derivation from supplier cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarkupRule {
    /// cost + amount
    Fixed { amount: i64 },
    /// cost * (1 + percent / 100)
    Percentage { percent: Decimal },
}

/// Held price change waiting for manual approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPriceChange {
    /// Supplier cost before the change
    pub old_price: i64,
    /// Supplier cost after the change
    pub new_price: i64,
    /// Signed relative change, in percent
    pub change_percent: Decimal,
    pub detected_at: i64,
}

/// Link between a retail product and a supplier product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSupplierMapping {
    pub id: i64,
    pub product_id: i64,
    pub supplier_product_id: i64,
    pub supplier_id: i64,
    pub markup: MarkupRule,
    pub auto_update_price: bool,
    pub auto_update_stock: bool,
    pub is_active: bool,
    #[serde(default)]
    pub pending_price_change: Option<PendingPriceChange>,
    pub updated_at: i64,
}
