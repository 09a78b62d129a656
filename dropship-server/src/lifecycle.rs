//! Dropship order status transitions
//!
//! All status writes (dispatch responses, webhooks, retries, permanent
//! failure) go through [`DropshipLifecycle::transition`]:
//!
//! - same status again: no-op, which makes webhook replays idempotent
//! - terminal current status: logged and ignored, never regressed
//! - illegal edge: [`EngineError::IllegalTransition`]
//! - otherwise a compare-and-set against the status just read; a lost race
//!   is re-evaluated against the fresh row
//!
//! A successful transition publishes `DropshipStatusChanged` and re-runs the
//! order aggregator.

use crate::aggregator::Aggregator;
use crate::core::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::storage::{EngineStorage, StorageError};
use shared::models::{DropshipOrder, DropshipStatus};

const MAX_CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(DropshipOrder),
    /// Already in the requested status
    Unchanged(DropshipOrder),
    /// Current status is terminal
    Ignored(DropshipOrder),
}

impl TransitionOutcome {
    pub fn order(&self) -> &DropshipOrder {
        match self {
            Self::Applied(o) | Self::Unchanged(o) | Self::Ignored(o) => o,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Clone)]
pub struct DropshipLifecycle {
    storage: EngineStorage,
    events: EventBus,
    aggregator: Aggregator,
}

impl DropshipLifecycle {
    pub fn new(storage: EngineStorage, events: EventBus) -> Self {
        let aggregator = Aggregator::new(storage.clone(), events.clone());
        Self {
            storage,
            events,
            aggregator,
        }
    }

    pub fn load(&self, id: i64) -> EngineResult<DropshipOrder> {
        self.storage
            .get_dropship_order(id)?
            .ok_or_else(|| EngineError::NotFound(format!("dropship order {id}")))
    }

    /// Move a dropship order to `to`, applying `mutate` in the same write.
    ///
    /// `mutate` may run more than once when the compare-and-set loses a race.
    pub fn transition<F>(&self, id: i64, to: DropshipStatus, mutate: F) -> EngineResult<TransitionOutcome>
    where
        F: Fn(&mut DropshipOrder),
    {
        let mut last_conflict = None;
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.load(id)?;
            if current.status == to {
                tracing::debug!(dropship_order_id = id, status = %to, "Status unchanged");
                return Ok(TransitionOutcome::Unchanged(current));
            }
            if current.status.is_terminal() {
                tracing::warn!(
                    dropship_order_id = id,
                    current = %current.status,
                    requested = %to,
                    "Dropship order is terminal, transition ignored"
                );
                return Ok(TransitionOutcome::Ignored(current));
            }
            if !current.status.can_transition_to(to) {
                return Err(EngineError::IllegalTransition {
                    from: current.status,
                    to,
                });
            }

            let now = shared::util::now_millis();
            match self.storage.compare_and_set_status(id, current.status, |row| {
                row.set_status(to, now);
                mutate(row);
            }) {
                Ok(updated) => {
                    tracing::info!(
                        dropship_order_id = id,
                        order_id = updated.order_id,
                        from = %current.status,
                        to = %to,
                        "Dropship status changed"
                    );
                    self.events.emit(EngineEvent::DropshipStatusChanged {
                        dropship_order_id: id,
                        order_id: updated.order_id,
                        supplier_id: updated.supplier_id,
                        from: current.status,
                        to,
                    });
                    self.aggregator.recompute(&updated)?;
                    return Ok(TransitionOutcome::Applied(updated));
                }
                Err(err @ StorageError::StatusConflict { .. }) => {
                    tracing::debug!(dropship_order_id = id, error = %err, "Lost status race, re-reading");
                    last_conflict = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(last_conflict
            .map(EngineError::from)
            .unwrap_or_else(|| EngineError::NotFound(format!("dropship order {id}"))))
    }

    /// Append an audit note without touching the status
    pub fn note(&self, id: i64, message: impl Into<String>) -> EngineResult<DropshipOrder> {
        let message = message.into();
        let now = shared::util::now_millis();
        Ok(self
            .storage
            .update_dropship_order(id, |row| row.add_note(message, now))?)
    }
}
