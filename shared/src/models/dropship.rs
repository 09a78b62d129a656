//! Dropship Order Model
//!
//! 供应商子订单：每个 (Order, Supplier) 对应一个 DropshipOrder。
//!
//! Status state machine:
//!
//! ```text
//! pending → sent_to_supplier → confirmed_by_supplier → processing
//!         → shipped_by_supplier → out_for_delivery → delivered      (terminal)
//! pending | sent | confirmed → rejected_by_supplier → pending       (retry)
//! any non-terminal → on_hold → pending                              (retry)
//! any non-terminal → cancelled | refunded                           (terminal)
//! ```
//!
//! The main chain is forward-only; a supplier may skip steps.

use super::order::{Customer, ShippingAddress};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropshipStatus {
    Pending,
    SentToSupplier,
    ConfirmedBySupplier,
    Processing,
    ShippedBySupplier,
    OutForDelivery,
    Delivered,
    Cancelled,
    RejectedBySupplier,
    OnHold,
    Refunded,
}

impl DropshipStatus {
    pub const ALL: [DropshipStatus; 11] = [
        Self::Pending,
        Self::SentToSupplier,
        Self::ConfirmedBySupplier,
        Self::Processing,
        Self::ShippedBySupplier,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Cancelled,
        Self::RejectedBySupplier,
        Self::OnHold,
        Self::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::SentToSupplier => "sent_to_supplier",
            Self::ConfirmedBySupplier => "confirmed_by_supplier",
            Self::Processing => "processing",
            Self::ShippedBySupplier => "shipped_by_supplier",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::RejectedBySupplier => "rejected_by_supplier",
            Self::OnHold => "on_hold",
            Self::Refunded => "refunded",
        }
    }

    /// Terminal statuses accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    /// Statuses the retry engine may pick up
    pub fn is_retry_eligible(&self) -> bool {
        matches!(self, Self::Pending | Self::RejectedBySupplier | Self::OnHold)
    }

    /// Position on the forward-only fulfillment chain
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::SentToSupplier => Some(1),
            Self::ConfirmedBySupplier => Some(2),
            Self::Processing => Some(3),
            Self::ShippedBySupplier => Some(4),
            Self::OutForDelivery => Some(5),
            Self::Delivered => Some(6),
            _ => None,
        }
    }

    /// Whether `self → next` is a legal transition.
    ///
    /// Same-status is not a transition; callers treat it as a no-op.
    pub fn can_transition_to(&self, next: DropshipStatus) -> bool {
        if *self == next || self.is_terminal() {
            return false;
        }
        match next {
            Self::Cancelled | Self::Refunded | Self::OnHold => true,
            Self::RejectedBySupplier => matches!(
                self,
                Self::Pending | Self::SentToSupplier | Self::ConfirmedBySupplier | Self::OnHold
            ),
            Self::Pending => matches!(self, Self::RejectedBySupplier | Self::OnHold),
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                // on_hold resumes anywhere on the chain
                (None, Some(_)) => *self == Self::OnHold,
                _ => false,
            },
        }
    }
}

impl std::fmt::Display for DropshipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamped audit entry attached to a dropship order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditNote {
    pub at: i64,
    pub message: String,
}

/// Dropship order line (immutable after creation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropshipOrderItem {
    /// Originating order line item
    pub order_item_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub supplier_product_id: i64,
    pub supplier_sku: String,
    pub quantity: i64,
    /// Supplier cost snapshot in minor units
    pub unit_supplier_cost: i64,
}

/// Supplier-scoped sub-order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropshipOrder {
    pub id: i64,
    pub order_id: i64,
    pub supplier_id: i64,
    pub status: DropshipStatus,
    pub retry_count: u32,
    #[serde(default)]
    pub supplier_order_id: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
    /// Snapshots taken at creation
    pub customer: Customer,
    pub shipping_address: Option<ShippingAddress>,
    pub currency: String,
    pub items: Vec<DropshipOrderItem>,
    /// Sum of quantity * unit_supplier_cost
    pub total_cost: i64,
    #[serde(default)]
    pub notes: Vec<AuditNote>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub sent_to_supplier_at: Option<i64>,
    #[serde(default)]
    pub confirmed_at: Option<i64>,
    #[serde(default)]
    pub shipped_at: Option<i64>,
    #[serde(default)]
    pub delivered_at: Option<i64>,
    #[serde(default)]
    pub cancelled_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DropshipOrder {
    pub fn add_note(&mut self, message: impl Into<String>, now: i64) {
        self.notes.push(AuditNote {
            at: now,
            message: message.into(),
        });
        self.updated_at = now;
    }

    /// Set status and stamp the matching lifecycle timestamp
    pub fn set_status(&mut self, status: DropshipStatus, now: i64) {
        self.status = status;
        self.updated_at = now;
        match status {
            DropshipStatus::SentToSupplier => {
                self.sent_to_supplier_at.get_or_insert(now);
            }
            DropshipStatus::ConfirmedBySupplier => {
                self.sent_to_supplier_at.get_or_insert(now);
                self.confirmed_at = Some(now);
            }
            DropshipStatus::ShippedBySupplier => self.shipped_at = Some(now),
            DropshipStatus::Delivered => self.delivered_at = Some(now),
            DropshipStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
    }
}
