//! Engine events
//!
//! Every side effect that follows a state change (inventory, notifications,
//! submission) is driven by an [`EngineEvent`] published on the [`EventBus`]
//! rather than performed inside the transition itself.

use crate::sync::SyncReport;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{DropshipStatus, FulfillmentStatus, OrderStatus};
use tokio::sync::broadcast;

pub use crate::core::event_router::{EventChannels, EventRouter};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A dropship order was created by decomposition and awaits submission
    DropshipCreated {
        dropship_order_id: i64,
        order_id: i64,
        supplier_id: i64,
    },
    DropshipStatusChanged {
        dropship_order_id: i64,
        order_id: i64,
        supplier_id: i64,
        from: DropshipStatus,
        to: DropshipStatus,
    },
    OrderStatusChanged {
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
        fulfillment: FulfillmentStatus,
    },
    /// Extreme supplier price swing held for manual approval
    PriceChangeHeld {
        mapping_id: i64,
        product_id: i64,
        old_price: i64,
        new_price: i64,
        change_percent: Decimal,
    },
    SubmissionFailed {
        dropship_order_id: i64,
        supplier_id: i64,
        error: String,
        retryable: bool,
    },
    /// Retry budget exhausted, the dropship order was auto-cancelled
    DropshipPermanentlyFailed {
        dropship_order_id: i64,
        order_id: i64,
        supplier_id: i64,
        reason: String,
    },
    SyncCompleted {
        supplier_id: i64,
        report: SyncReport,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DropshipCreated { .. } => "dropship_created",
            Self::DropshipStatusChanged { .. } => "dropship_status_changed",
            Self::OrderStatusChanged { .. } => "order_status_changed",
            Self::PriceChangeHeld { .. } => "price_change_held",
            Self::SubmissionFailed { .. } => "submission_failed",
            Self::DropshipPermanentlyFailed { .. } => "dropship_permanently_failed",
            Self::SyncCompleted { .. } => "sync_completed",
        }
    }
}

/// Broadcast bus shared by every engine component
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: EngineEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            tracing::debug!(event = kind, "No event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
