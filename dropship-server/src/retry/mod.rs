//! Retry & Recovery
//!
//! Picks up dropship orders that failed submission or sit in a
//! retry-eligible status (`pending`, `rejected_by_supplier`, `on_hold`),
//! validates them again and hands them back to the [`Dispatcher`].
//!
//! # Flow
//!
//! ```text
//! retry(id)
//!   ├─ cutoff reached / wrong status / supplier inactive -> RetryRejected
//!   ├─ pre-flight (stock, integrity)                       -> note + error
//!   ├─ retry_count += 1, rejected|on_hold -> pending
//!   └─ Dispatcher::submit
//!        ├─ ok                                             -> Resubmitted
//!        ├─ non-retryable (configuration, conflict)        -> parked + admin mail, error
//!        ├─ failed, cutoff reached                         -> cancelled + admin mail
//!        └─ failed                                         -> RetryJob after delay_for(retry_count)
//! ```
//!
//! The periodic [`RetryEngine::sweep`] only touches an exhausted order under
//! the supplier lock and once its last update is older than the in-flight
//! window, so it never cancels an order whose submission is still running.

mod policy;
mod preflight;
mod worker;

pub use policy::RetryPolicy;
pub use preflight::{check_integrity, stock_shortages};
pub use worker::{RetryJob, SubmissionHandler};

use crate::core::error::{EngineError, EngineResult};
use crate::dispatch::{Dispatcher, SubmissionOutcome};
use crate::events::{EngineEvent, EventBus};
use crate::lifecycle::{DropshipLifecycle, TransitionOutcome};
use crate::queue::QueueHandle;
use crate::storage::{EngineStorage, StorageError};
use shared::models::{DropshipOrder, DropshipStatus, SupplierProduct};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

const RETRY_ELIGIBLE: [DropshipStatus; 3] = [
    DropshipStatus::Pending,
    DropshipStatus::RejectedBySupplier,
    DropshipStatus::OnHold,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Resubmitted(SubmissionOutcome),
    /// Submission failed again; next attempt queued after `delay`
    Rescheduled { retry_count: u32, delay: Duration },
    /// Cutoff reached, order cancelled
    PermanentlyFailed,
}

#[derive(Clone)]
pub struct RetryEngine {
    storage: EngineStorage,
    lifecycle: DropshipLifecycle,
    events: EventBus,
    dispatcher: Dispatcher,
    policy: RetryPolicy,
    queue: Option<QueueHandle<RetryJob>>,
}

impl RetryEngine {
    pub fn new(
        storage: EngineStorage,
        lifecycle: DropshipLifecycle,
        events: EventBus,
        dispatcher: Dispatcher,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            lifecycle,
            events,
            dispatcher,
            policy,
            queue: None,
        }
    }

    /// Schedule follow-up retries on this queue
    pub fn with_queue(mut self, queue: QueueHandle<RetryJob>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn retry(&self, dropship_order_id: i64) -> EngineResult<RetryOutcome> {
        let order = self.lifecycle.load(dropship_order_id)?;
        if let Err(reason) = self.eligibility(&order) {
            tracing::info!(dropship_order_id, reason = %reason, "Retry rejected");
            return Err(EngineError::RetryRejected(reason));
        }

        if let Err(err) = self.preflight(&order) {
            tracing::warn!(dropship_order_id, error = %err, "Retry pre-flight failed");
            self.lifecycle
                .note(order.id, format!("Retry pre-flight failed: {err}"))?;
            return Err(err);
        }

        let alternatives = self.alternative_suppliers(&order)?;
        if !alternatives.is_empty() {
            tracing::info!(
                dropship_order_id,
                supplier_id = order.supplier_id,
                alternatives = ?alternatives,
                "Alternative suppliers can fill this order"
            );
        }

        let retry_count = self.begin_attempt(&order)?;

        match self.dispatcher.submit(order.id).await {
            Ok(outcome) => {
                tracing::info!(dropship_order_id, retry_count, "Retry submitted");
                Ok(RetryOutcome::Resubmitted(outcome))
            }
            Err(err) if err.is_retryable() => {
                self.after_failure(order.id, retry_count, &err.to_string())
            }
            // noted, parked and reported to admins by the dispatcher
            Err(err) => {
                tracing::error!(
                    dropship_order_id,
                    retry_count,
                    error = %err,
                    "Retry hit a non-retryable failure, order parked"
                );
                Err(err)
            }
        }
    }

    /// Route a failed attempt: permanent failure at the cutoff, otherwise
    /// queue the next retry after the table delay
    pub fn after_failure(
        &self,
        dropship_order_id: i64,
        retry_count: u32,
        reason: &str,
    ) -> EngineResult<RetryOutcome> {
        if self.policy.is_exhausted(retry_count) {
            self.permanent_failure(dropship_order_id, reason)?;
            return Ok(RetryOutcome::PermanentlyFailed);
        }
        let delay = self.policy.delay_for(retry_count);
        match &self.queue {
            Some(queue) => queue.enqueue_after(RetryJob { dropship_order_id }, delay),
            None => tracing::debug!(dropship_order_id, "No retry queue attached, sweep will pick it up"),
        }
        tracing::info!(
            dropship_order_id,
            retry_count,
            delay_secs = delay.as_secs(),
            "Retry scheduled"
        );
        Ok(RetryOutcome::Rescheduled { retry_count, delay })
    }

    /// Cancel with the failure recorded and tell the admins
    pub fn permanent_failure(&self, dropship_order_id: i64, reason: &str) -> EngineResult<()> {
        let now = shared::util::now_millis();
        let outcome = self
            .lifecycle
            .transition(dropship_order_id, DropshipStatus::Cancelled, |d| {
                d.failure_reason = Some(reason.to_string());
                d.add_note(
                    format!("Permanently failed after {} retries: {reason}", d.retry_count),
                    now,
                );
            })?;
        if let TransitionOutcome::Applied(order) = outcome {
            tracing::error!(
                dropship_order_id,
                order_id = order.order_id,
                supplier_id = order.supplier_id,
                reason,
                "Dropship order permanently failed"
            );
            self.events.emit(EngineEvent::DropshipPermanentlyFailed {
                dropship_order_id,
                order_id: order.order_id,
                supplier_id: order.supplier_id,
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    /// Orders in a retry-eligible status whose table delay has run out since
    /// their last update. Exhausted ones are failed on the spot; parked ones
    /// (non-retryable failure recorded) wait for a manual retry.
    pub async fn sweep(&self, now: i64) -> EngineResult<Vec<i64>> {
        let mut due = Vec::new();
        for order in self.storage.dropship_orders_with_status(&RETRY_ELIGIBLE)? {
            if self.policy.is_exhausted(order.retry_count) {
                self.fail_exhausted(&order, now).await?;
                continue;
            }
            if order.failure_reason.is_some() {
                continue;
            }
            let delay = i64::try_from(self.policy.delay_for(order.retry_count).as_millis())
                .unwrap_or(i64::MAX);
            if order.updated_at.saturating_add(delay) <= now {
                due.push(order.id);
            }
        }
        if !due.is_empty() {
            tracing::info!(count = due.len(), "Stuck dropship orders due for retry");
        }
        Ok(due)
    }

    async fn fail_exhausted(&self, order: &DropshipOrder, now: i64) -> EngineResult<()> {
        if self.policy.may_be_in_flight(order.updated_at, now) {
            tracing::debug!(
                dropship_order_id = order.id,
                "Exhausted order touched recently, left for a later sweep"
            );
            return Ok(());
        }

        let _guard = self.dispatcher.locks().acquire(order.supplier_id).await;
        // the last attempt may have finished while we waited for the lock
        let current = self.lifecycle.load(order.id)?;
        if !current.status.is_retry_eligible()
            || !self.policy.is_exhausted(current.retry_count)
            || self.policy.may_be_in_flight(current.updated_at, now)
        {
            return Ok(());
        }
        self.permanent_failure(current.id, "retry budget exhausted")
    }

    /// Other active suppliers carrying every SKU with enough stock.
    /// Informational; orders are never reassigned.
    pub fn alternative_suppliers(&self, order: &DropshipOrder) -> EngineResult<Vec<i64>> {
        let mut candidates: Option<BTreeSet<i64>> = None;
        for item in &order.items {
            let holders: BTreeSet<i64> = self
                .storage
                .supplier_products_by_sku(&item.supplier_sku)?
                .into_iter()
                .filter(|sp| sp.supplier_id != order.supplier_id && sp.can_fulfill(item.quantity))
                .map(|sp| sp.supplier_id)
                .collect();
            candidates = Some(match candidates {
                Some(current) => current.intersection(&holders).copied().collect(),
                None => holders,
            });
        }

        let mut active = Vec::new();
        for supplier_id in candidates.unwrap_or_default() {
            if self
                .storage
                .get_supplier(supplier_id)?
                .is_some_and(|s| s.is_active())
            {
                active.push(supplier_id);
            }
        }
        Ok(active)
    }

    fn eligibility(&self, order: &DropshipOrder) -> Result<(), String> {
        if self.policy.is_exhausted(order.retry_count) {
            return Err(format!(
                "retry count {} reached cutoff {}",
                order.retry_count, self.policy.max_retries
            ));
        }
        if !order.status.is_retry_eligible() {
            return Err(format!("status {} is not retryable", order.status));
        }
        match self.storage.get_supplier(order.supplier_id) {
            Ok(Some(supplier)) if supplier.is_active() => Ok(()),
            Ok(Some(_)) => Err(format!("supplier {} is not active", order.supplier_id)),
            Ok(None) => Err(format!("supplier {} not found", order.supplier_id)),
            Err(e) => Err(format!("supplier lookup failed: {e}")),
        }
    }

    fn preflight(&self, order: &DropshipOrder) -> EngineResult<()> {
        let mut products: HashMap<i64, SupplierProduct> = HashMap::new();
        for item in &order.items {
            if let Some(sp) = self.storage.get_supplier_product(item.supplier_product_id)? {
                products.insert(sp.id, sp);
            }
        }
        let shortages = stock_shortages(order, &products);
        if !shortages.is_empty() {
            return Err(EngineError::InsufficientStock(shortages));
        }
        let parent = self.storage.get_order(order.order_id)?;
        check_integrity(order, parent.as_ref())
    }

    /// Bump `retry_count` and put the order back to `pending`. Returns the
    /// new count.
    fn begin_attempt(&self, order: &DropshipOrder) -> EngineResult<u32> {
        let now = shared::util::now_millis();
        let note = |d: &mut DropshipOrder| {
            d.retry_count += 1;
            d.failure_reason = None;
            d.add_note(format!("Retry attempt {}", d.retry_count), now);
        };

        let updated = if order.status == DropshipStatus::Pending {
            match self
                .storage
                .compare_and_set_status(order.id, DropshipStatus::Pending, note)
            {
                Ok(updated) => updated,
                Err(StorageError::StatusConflict { actual, .. }) => {
                    return Err(EngineError::RetryRejected(format!(
                        "order moved to {actual} before retry"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            match self
                .lifecycle
                .transition(order.id, DropshipStatus::Pending, note)?
            {
                TransitionOutcome::Applied(updated) => updated,
                other => {
                    return Err(EngineError::RetryRejected(format!(
                        "order is {}",
                        other.order().status
                    )));
                }
            }
        };
        Ok(updated.retry_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{SupplierLocks, TransportContext};
    use crate::dispatch::transport::InMemoryFtp;
    use crate::notify::LogNotifier;
    use crate::test_support::{seed_catalog, seed_decomposed_order, test_storage};
    use httpmock::prelude::*;
    use serde_json::json;
    use shared::models::{FtpConfig, IntegrationType, SupplierStatus};
    use std::sync::Arc;

    fn engine(storage: &EngineStorage, ftp: InMemoryFtp) -> RetryEngine {
        let events = EventBus::default();
        let lifecycle = DropshipLifecycle::new(storage.clone(), events.clone());
        let transports = TransportContext::new(
            Duration::from_secs(2),
            Arc::new(ftp),
            Arc::new(LogNotifier),
        )
        .unwrap();
        let dispatcher = Dispatcher::new(
            storage.clone(),
            lifecycle.clone(),
            events.clone(),
            SupplierLocks::new(),
            transports,
        );
        RetryEngine::new(
            storage.clone(),
            lifecycle,
            events,
            dispatcher,
            RetryPolicy::default(),
        )
    }

    fn use_ftp(storage: &EngineStorage, supplier_id: i64) {
        let integration = storage.active_integration(supplier_id).unwrap().unwrap();
        storage
            .update_integration(integration.id, |i| {
                i.integration_type = IntegrationType::Ftp;
                i.ftp = Some(FtpConfig {
                    host: "ftp.supplier.test".into(),
                    port: 21,
                    username: "shop".into(),
                    password: "pw".into(),
                    directory: None,
                    passive: true,
                });
            })
            .unwrap();
    }

    fn set_status(storage: &EngineStorage, id: i64, status: DropshipStatus, retry_count: u32) {
        storage
            .update_dropship_order(id, |d| {
                d.status = status;
                d.retry_count = retry_count;
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_order_is_resubmitted() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        use_ftp(&storage, d.supplier_id);
        set_status(&storage, d.id, DropshipStatus::RejectedBySupplier, 0);

        let outcome = engine(&storage, InMemoryFtp::new()).retry(d.id).await.unwrap();
        assert!(matches!(outcome, RetryOutcome::Resubmitted(SubmissionOutcome::Submitted { .. })));

        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.status, DropshipStatus::SentToSupplier);
        assert!(stored.notes.iter().any(|n| n.message == "Retry attempt 1"));
    }

    #[tokio::test]
    async fn test_retry_rejections() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let engine = engine(&storage, InMemoryFtp::new());

        set_status(&storage, d.id, DropshipStatus::Pending, 3);
        assert!(matches!(engine.retry(d.id).await, Err(EngineError::RetryRejected(_))));

        set_status(&storage, d.id, DropshipStatus::Processing, 0);
        assert!(matches!(engine.retry(d.id).await, Err(EngineError::RetryRejected(_))));

        set_status(&storage, d.id, DropshipStatus::Pending, 0);
        let mut supplier = storage.get_supplier(d.supplier_id).unwrap().unwrap();
        supplier.status = SupplierStatus::Inactive;
        storage.save_supplier(&supplier).unwrap();
        assert!(matches!(engine.retry(d.id).await, Err(EngineError::RetryRejected(_))));

        assert_eq!(storage.get_dropship_order(d.id).unwrap().unwrap().retry_count, 0);
    }

    #[tokio::test]
    async fn test_shortage_blocks_retry() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let mut sp = storage
            .get_supplier_product(d.items[0].supplier_product_id)
            .unwrap()
            .unwrap();
        sp.stock_quantity = 1;
        storage.create_supplier_product(sp).unwrap();

        let err = engine(&storage, InMemoryFtp::new()).retry(d.id).await.unwrap_err();
        match err {
            EngineError::InsufficientStock(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].requested, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.retry_count, 0);
        assert!(stored.notes.last().unwrap().message.contains("pre-flight"));
    }

    #[tokio::test]
    async fn test_last_failure_cancels_order() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        // nothing listens there: every submission is a connection failure
        let integration = storage.active_integration(d.supplier_id).unwrap().unwrap();
        storage
            .update_integration(integration.id, |i| {
                i.api_endpoint = Some("http://127.0.0.1:9/v1".into());
            })
            .unwrap();
        let engine = engine(&storage, InMemoryFtp::new());
        let mut events = engine.events.subscribe();

        set_status(&storage, d.id, DropshipStatus::Pending, 1);
        let outcome = engine.retry(d.id).await.unwrap();
        assert_eq!(
            outcome,
            RetryOutcome::Rescheduled {
                retry_count: 2,
                delay: Duration::from_secs(3600)
            }
        );

        let outcome = engine.retry(d.id).await.unwrap();
        assert_eq!(outcome, RetryOutcome::PermanentlyFailed);

        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.status, DropshipStatus::Cancelled);
        assert!(stored.failure_reason.is_some());

        let mut saw_permanent = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, EngineEvent::DropshipPermanentlyFailed { .. }) {
                saw_permanent = true;
            }
        }
        assert!(saw_permanent);
    }

    #[tokio::test]
    async fn test_configuration_failure_is_not_rescheduled() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let integration = storage.active_integration(d.supplier_id).unwrap().unwrap();
        storage
            .update_integration(integration.id, |i| i.api_endpoint = None)
            .unwrap();
        let engine = engine(&storage, InMemoryFtp::new());
        let mut events = engine.events.subscribe();

        set_status(&storage, d.id, DropshipStatus::Pending, 1);
        let err = engine.retry(d.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));

        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.status, DropshipStatus::Pending);
        assert_eq!(stored.retry_count, 2);
        assert!(stored.failure_reason.is_some());

        let mut admin_notice = false;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::SubmissionFailed { retryable, .. } = event {
                assert!(!retryable);
                admin_notice = true;
            }
        }
        assert!(admin_notice);

        // parked: the sweep never picks it up again on its own
        let much_later = stored.updated_at + 86_400_000;
        assert!(engine.sweep(much_later).await.unwrap().is_empty());
        assert_eq!(
            storage.get_dropship_order(d.id).unwrap().unwrap().status,
            DropshipStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_sweep_selects_due_orders() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 2);
        let engine = engine(&storage, InMemoryFtp::new());
        let (fresh, stale) = (&dropship[0], &dropship[1]);
        storage
            .update_dropship_order(stale.id, |d| d.updated_at = 0)
            .unwrap();

        let now = storage.get_dropship_order(fresh.id).unwrap().unwrap().updated_at;
        assert_eq!(engine.sweep(now).await.unwrap(), vec![stale.id]);

        set_status(&storage, stale.id, DropshipStatus::OnHold, 3);
        assert!(engine.sweep(now).await.unwrap().is_empty());
        assert_eq!(
            storage.get_dropship_order(stale.id).unwrap().unwrap().status,
            DropshipStatus::Cancelled
        );
    }

    fn slow_supplier_api(storage: &EngineStorage, supplier_id: i64, server: &MockServer) {
        let integration = storage.active_integration(supplier_id).unwrap().unwrap();
        let endpoint = server.url("/v1");
        storage
            .update_integration(integration.id, |i| i.api_endpoint = Some(endpoint))
            .unwrap();
    }

    async fn mock_slow_confirm(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/orders");
                then.status(200)
                    .json_body(json!({ "order_id": "SUP-9" }))
                    .delay(Duration::from_millis(600));
            })
            .await;
    }

    #[tokio::test]
    async fn test_sweep_leaves_last_attempt_in_flight_alone() {
        let server = MockServer::start_async().await;
        mock_slow_confirm(&server).await;
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        slow_supplier_api(&storage, d.supplier_id, &server);
        set_status(&storage, d.id, DropshipStatus::RejectedBySupplier, 2);
        let engine = engine(&storage, InMemoryFtp::new());

        let in_flight = tokio::spawn({
            let engine = engine.clone();
            let id = d.id;
            async move { engine.retry(id).await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        let swept = engine.sweep(shared::util::now_millis()).await.unwrap();
        assert!(swept.is_empty());

        let outcome = in_flight.await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            RetryOutcome::Resubmitted(SubmissionOutcome::Submitted {
                status: DropshipStatus::ConfirmedBySupplier,
                ..
            })
        ));
        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.status, DropshipStatus::ConfirmedBySupplier);
        assert_eq!(stored.retry_count, 3);
        assert_eq!(stored.supplier_order_id.as_deref(), Some("SUP-9"));
        assert!(stored.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_sweep_waits_for_supplier_lock_before_failing() {
        let server = MockServer::start_async().await;
        mock_slow_confirm(&server).await;
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        slow_supplier_api(&storage, d.supplier_id, &server);
        set_status(&storage, d.id, DropshipStatus::RejectedBySupplier, 2);
        // no in-flight window: only the lock protects the running attempt
        let engine = RetryEngine {
            policy: RetryPolicy {
                in_flight_grace_secs: 0,
                ..Default::default()
            },
            ..engine(&storage, InMemoryFtp::new())
        };

        let in_flight = tokio::spawn({
            let engine = engine.clone();
            let id = d.id;
            async move { engine.retry(id).await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(engine.sweep(shared::util::now_millis()).await.unwrap().is_empty());

        assert!(in_flight.await.unwrap().is_ok());
        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.status, DropshipStatus::ConfirmedBySupplier);
        assert_eq!(stored.supplier_order_id.as_deref(), Some("SUP-9"));
    }

    #[test]
    fn test_alternative_suppliers() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let other = seed_catalog(&storage, 0);
        for item in &d.items {
            let mut sp = storage
                .get_supplier_product(item.supplier_product_id)
                .unwrap()
                .unwrap();
            sp.id = 0;
            sp.supplier_id = other.supplier.id;
            storage.create_supplier_product(sp).unwrap();
        }

        let engine = engine(&storage, InMemoryFtp::new());
        assert_eq!(engine.alternative_suppliers(d).unwrap(), vec![other.supplier.id]);
    }
}
