//! Order Status Aggregator
//!
//! Re-derives a customer order's `status` and `fulfillment_status` after
//! every dropship order transition. This is the only writer of those two
//! fields once an order has been decomposed.

mod rules;

pub use rules::{aggregate_order_status, derive_fulfillment_status};

use crate::core::error::EngineResult;
use crate::events::{EngineEvent, EventBus};
use crate::storage::EngineStorage;
use shared::models::{DropshipOrder, Order};

#[derive(Clone)]
pub struct Aggregator {
    storage: EngineStorage,
    events: EventBus,
}

impl Aggregator {
    pub fn new(storage: EngineStorage, events: EventBus) -> Self {
        Self { storage, events }
    }

    /// Recompute the parent of `trigger` and emit `OrderStatusChanged` when
    /// its status moved.
    pub fn recompute(&self, trigger: &DropshipOrder) -> EngineResult<Option<Order>> {
        let now = shared::util::now_millis();
        let result = self
            .storage
            .update_order_with_children(trigger.order_id, |order, children| {
                let statuses: Vec<_> = children.iter().map(|c| c.status).collect();
                let previous = order.status;
                if let Some(next) = aggregate_order_status(&statuses, trigger.status) {
                    order.status = next;
                }
                order.fulfillment_status = derive_fulfillment_status(&statuses);
                order.updated_at = now;
                previous
            })?;

        let Some((order, previous)) = result else {
            tracing::warn!(
                order_id = trigger.order_id,
                dropship_order_id = trigger.id,
                "Parent order missing, aggregation skipped"
            );
            return Ok(None);
        };

        if order.status != previous {
            tracing::info!(
                order_id = order.id,
                from = %previous,
                to = %order.status,
                fulfillment = ?order.fulfillment_status,
                "Order status aggregated"
            );
            self.events.emit(EngineEvent::OrderStatusChanged {
                order_id: order.id,
                from: previous,
                to: order.status,
                fulfillment: order.fulfillment_status,
            });
        }
        Ok(Some(order))
    }
}
