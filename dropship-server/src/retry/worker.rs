//! Queue handlers for `submission` and `retry`

use super::{RetryEngine, RetryOutcome};
use crate::core::error::{EngineError, EngineResult};
use crate::dispatch::{Dispatcher, SubmissionJob};
use crate::queue::JobHandler;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::DropshipStatus;

/// Queue payload for the `retry` queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryJob {
    pub dropship_order_id: i64,
}

#[async_trait]
impl JobHandler<RetryJob> for RetryEngine {
    async fn handle(&self, job: &RetryJob) -> EngineResult<()> {
        match self.retry(job.dropship_order_id).await {
            Ok(outcome) => {
                tracing::debug!(dropship_order_id = job.dropship_order_id, outcome = ?outcome, "Retry job done");
                Ok(())
            }
            // business outcomes, already logged and noted
            Err(
                EngineError::RetryRejected(_)
                | EngineError::InsufficientStock(_)
                | EngineError::Validation(_)
                | EngineError::Configuration(_)
                | EngineError::SupplierInactive(_)
                | EngineError::SubmissionConflict { .. },
            ) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// First submission of freshly created dropship orders
pub struct SubmissionHandler {
    dispatcher: Dispatcher,
    retry: RetryEngine,
}

impl SubmissionHandler {
    pub fn new(dispatcher: Dispatcher, retry: RetryEngine) -> Self {
        Self { dispatcher, retry }
    }

    /// The queue gave up on transport errors: hand the order to the retry
    /// table, or fail it for good when the retry budget is spent
    pub fn handle_exhausted(&self, dropship_order_id: i64, error: &EngineError) -> EngineResult<RetryOutcome> {
        let order = self
            .retry
            .storage
            .get_dropship_order(dropship_order_id)?
            .ok_or_else(|| EngineError::NotFound(format!("dropship order {dropship_order_id}")))?;
        if order.status != DropshipStatus::Pending {
            return Err(EngineError::RetryRejected(format!(
                "order is {}",
                order.status
            )));
        }
        self.retry
            .after_failure(dropship_order_id, order.retry_count, &error.to_string())
    }
}

#[async_trait]
impl JobHandler<SubmissionJob> for SubmissionHandler {
    async fn handle(&self, job: &SubmissionJob) -> EngineResult<()> {
        self.dispatcher.submit(job.dropship_order_id).await.map(|_| ())
    }

    async fn on_exhausted(&self, job: &SubmissionJob, error: &EngineError) {
        match self.handle_exhausted(job.dropship_order_id, error) {
            Ok(outcome) => tracing::info!(
                dropship_order_id = job.dropship_order_id,
                outcome = ?outcome,
                "Submission handed to retry"
            ),
            Err(e) => tracing::warn!(
                dropship_order_id = job.dropship_order_id,
                error = %e,
                "Exhausted submission not handed to retry"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::transport::InMemoryFtp;
    use crate::dispatch::{SupplierLocks, TransportContext};
    use crate::events::EventBus;
    use crate::lifecycle::DropshipLifecycle;
    use crate::notify::LogNotifier;
    use crate::retry::RetryPolicy;
    use crate::storage::EngineStorage;
    use crate::test_support::{seed_decomposed_order, test_storage};
    use std::sync::Arc;
    use std::time::Duration;

    fn handler(storage: &EngineStorage) -> SubmissionHandler {
        let events = EventBus::default();
        let lifecycle = DropshipLifecycle::new(storage.clone(), events.clone());
        let transports = TransportContext::new(
            Duration::from_secs(1),
            Arc::new(InMemoryFtp::new()),
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
        let retry = RetryEngine::new(
            storage.clone(),
            lifecycle,
            events,
            dispatcher.clone(),
            RetryPolicy::default(),
        );
        SubmissionHandler::new(dispatcher, retry)
    }

    #[tokio::test]
    async fn test_exhausted_submission_goes_to_retry_table() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let handler = handler(&storage);

        let outcome = handler
            .handle_exhausted(d.id, &EngineError::Transport("503".into()))
            .unwrap();
        assert_eq!(
            outcome,
            RetryOutcome::Rescheduled {
                retry_count: 0,
                delay: Duration::from_secs(300)
            }
        );
    }

    #[tokio::test]
    async fn test_exhausted_submission_past_cutoff_is_cancelled() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        storage
            .update_dropship_order(d.id, |o| o.retry_count = 3)
            .unwrap();

        let outcome = handler(&storage)
            .handle_exhausted(d.id, &EngineError::Timeout("30s".into()))
            .unwrap();
        assert_eq!(outcome, RetryOutcome::PermanentlyFailed);
        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.status, DropshipStatus::Cancelled);
        assert_eq!(stored.failure_reason.as_deref(), Some("Timeout: 30s"));
    }
}
