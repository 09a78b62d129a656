//! Supplier Submission Dispatcher
//!
//! Sends one pending dropship order over its supplier's active integration.
//! On failure the integration's failure counter is bumped, a note is written
//! on the order and `SubmissionFailed` is published; scheduling a retry is
//! left to the recovery side. A non-retryable failure also stores
//! `failure_reason`, which parks the order until someone retries it by hand.

mod locks;
pub mod payload;
pub mod transport;

pub use locks::SupplierLocks;
pub use payload::{OutboundItem, OutboundOrderPayload};
pub use transport::{SubmissionReceipt, Transport, TransportContext};

use crate::core::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::lifecycle::{DropshipLifecycle, TransitionOutcome};
use crate::storage::EngineStorage;
use serde::{Deserialize, Serialize};
use shared::models::{DropshipOrder, DropshipStatus, SupplierIntegration};

/// Queue payload for the `submission` queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub dropship_order_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Submitted {
        status: DropshipStatus,
        supplier_order_id: Option<String>,
    },
    /// Order was no longer pending when its turn came
    Skipped(DropshipStatus),
}

#[derive(Clone)]
pub struct Dispatcher {
    storage: EngineStorage,
    lifecycle: DropshipLifecycle,
    events: EventBus,
    locks: SupplierLocks,
    transports: TransportContext,
}

impl Dispatcher {
    pub fn new(
        storage: EngineStorage,
        lifecycle: DropshipLifecycle,
        events: EventBus,
        locks: SupplierLocks,
        transports: TransportContext,
    ) -> Self {
        Self {
            storage,
            lifecycle,
            events,
            locks,
            transports,
        }
    }

    /// Locks shared with sync and the stuck-order sweep
    pub fn locks(&self) -> &SupplierLocks {
        &self.locks
    }

    pub async fn submit(&self, dropship_order_id: i64) -> EngineResult<SubmissionOutcome> {
        let supplier_id = self.lifecycle.load(dropship_order_id)?.supplier_id;
        let _guard = self.locks.acquire(supplier_id).await;

        // re-read under the supplier lock
        let order = self.lifecycle.load(dropship_order_id)?;
        if order.status != DropshipStatus::Pending {
            tracing::debug!(
                dropship_order_id,
                status = %order.status,
                "Dropship order not pending, submission skipped"
            );
            return Ok(SubmissionOutcome::Skipped(order.status));
        }

        let supplier = self
            .storage
            .get_supplier(supplier_id)?
            .ok_or_else(|| EngineError::NotFound(format!("supplier {supplier_id}")))?;
        if !supplier.is_active() {
            let err = EngineError::SupplierInactive(supplier_id);
            self.record_failure(&order, None, &err)?;
            return Err(err);
        }
        let Some(integration) = self.storage.active_integration(supplier_id)? else {
            let err = EngineError::Configuration(format!(
                "supplier {supplier_id} has no active integration"
            ));
            self.record_failure(&order, None, &err)?;
            return Err(err);
        };

        let payload = OutboundOrderPayload::from_dropship(&order);
        let attempt = async {
            let transport = Transport::for_integration(&integration, &supplier)?;
            transport.submit(&self.transports, &payload).await
        };

        match attempt.await {
            Ok(receipt) => self.record_success(&order, &integration, receipt),
            Err(err) => {
                tracing::warn!(
                    dropship_order_id,
                    supplier_id,
                    integration = %integration.integration_type,
                    error = %err,
                    "Submission failed"
                );
                self.record_failure(&order, Some(&integration), &err)?;
                Err(err)
            }
        }
    }

    fn record_success(
        &self,
        order: &DropshipOrder,
        integration: &SupplierIntegration,
        receipt: SubmissionReceipt,
    ) -> EngineResult<SubmissionOutcome> {
        let now = shared::util::now_millis();
        self.storage
            .update_integration(integration.id, |i| i.record_success(now))?;

        let status = if receipt.supplier_order_id.is_some() {
            DropshipStatus::ConfirmedBySupplier
        } else {
            DropshipStatus::SentToSupplier
        };
        let note = format!("Submitted via {}: {}", integration.integration_type, receipt.detail);
        let supplier_order_id = receipt.supplier_order_id.clone();

        match self.lifecycle.transition(order.id, status, |d| {
            if let Some(id) = &supplier_order_id {
                d.supplier_order_id = Some(id.clone());
            }
            d.failure_reason = None;
            d.add_note(note.clone(), now);
        }) {
            Ok(TransitionOutcome::Ignored(current)) => {
                let err = EngineError::SubmissionConflict {
                    id: order.id,
                    status: current.status,
                };
                tracing::error!(
                    dropship_order_id = order.id,
                    supplier_id = order.supplier_id,
                    current = %current.status,
                    supplier_order_id = ?receipt.supplier_order_id,
                    "Supplier accepted an order that is already closed"
                );
                self.record_failure(order, None, &err)?;
                return Err(err);
            }
            Ok(_) => {}
            // a webhook may have moved the order while we were sending
            Err(EngineError::IllegalTransition { from, .. }) => {
                tracing::warn!(
                    dropship_order_id = order.id,
                    current = %from,
                    "Order moved during submission, keeping its status"
                );
                self.lifecycle.note(order.id, note)?;
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            dropship_order_id = order.id,
            supplier_id = order.supplier_id,
            status = %status,
            "Dropship order submitted"
        );
        Ok(SubmissionOutcome::Submitted {
            status,
            supplier_order_id: receipt.supplier_order_id,
        })
    }

    fn record_failure(
        &self,
        order: &DropshipOrder,
        integration: Option<&SupplierIntegration>,
        err: &EngineError,
    ) -> EngineResult<()> {
        let now = shared::util::now_millis();
        if let Some(integration) = integration {
            let message = err.to_string();
            self.storage
                .update_integration(integration.id, |i| i.record_failure(message, now))?;
        }
        let message = format!("Submission failed: {err}");
        let park = !err.is_retryable();
        self.storage.update_dropship_order(order.id, |d| {
            if park {
                d.failure_reason.get_or_insert_with(|| err.to_string());
            }
            d.add_note(message, now);
        })?;
        self.events.emit(EngineEvent::SubmissionFailed {
            dropship_order_id: order.id,
            supplier_id: order.supplier_id,
            error: err.to_string(),
            retryable: err.is_retryable(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::test_support::{seed_decomposed_order, test_storage};
    use httpmock::prelude::*;
    use serde_json::json;
    use shared::models::{FtpConfig, IntegrationType};
    use std::sync::Arc;
    use std::time::Duration;
    use transport::InMemoryFtp;

    fn dispatcher(storage: &EngineStorage, ftp: InMemoryFtp) -> Dispatcher {
        let events = EventBus::default();
        let lifecycle = DropshipLifecycle::new(storage.clone(), events.clone());
        let transports =
            TransportContext::new(Duration::from_secs(2), Arc::new(ftp), Arc::new(LogNotifier))
                .unwrap();
        Dispatcher::new(storage.clone(), lifecycle, events, SupplierLocks::new(), transports)
    }

    fn switch_to_ftp(storage: &EngineStorage, supplier_id: i64) {
        let integration = storage.active_integration(supplier_id).unwrap().unwrap();
        storage
            .update_integration(integration.id, |i| {
                i.integration_type = IntegrationType::Ftp;
                i.ftp = Some(FtpConfig {
                    host: "ftp.supplier.test".into(),
                    port: 21,
                    username: "shop".into(),
                    password: "pw".into(),
                    directory: Some("/orders".into()),
                    passive: true,
                });
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_ftp_submission_marks_sent() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        switch_to_ftp(&storage, d.supplier_id);
        let ftp = InMemoryFtp::new();

        let outcome = dispatcher(&storage, ftp.clone()).submit(d.id).await.unwrap();
        assert_eq!(
            outcome,
            SubmissionOutcome::Submitted {
                status: DropshipStatus::SentToSupplier,
                supplier_order_id: None
            }
        );

        let paths = ftp.paths();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].starts_with(&format!("/orders/order_{}_", d.id)));

        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.status, DropshipStatus::SentToSupplier);
        assert!(stored.sent_to_supplier_at.is_some());
        let integration = storage.active_integration(d.supplier_id).unwrap().unwrap();
        assert_eq!(integration.consecutive_failures, 0);
        assert!(integration.last_successful_sync.is_some());
    }

    #[tokio::test]
    async fn test_configuration_failure_records_counter_and_note() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let integration = storage.active_integration(d.supplier_id).unwrap().unwrap();
        storage
            .update_integration(integration.id, |i| i.api_endpoint = None)
            .unwrap();

        let err = dispatcher(&storage, InMemoryFtp::new())
            .submit(d.id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));

        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.status, DropshipStatus::Pending);
        assert!(stored.notes.last().unwrap().message.starts_with("Submission failed"));
        assert!(stored.failure_reason.unwrap().starts_with("Configuration error"));
        let integration = storage.get_integration(integration.id).unwrap().unwrap();
        assert_eq!(integration.consecutive_failures, 1);
        assert!(integration.last_error.is_some());
    }

    #[tokio::test]
    async fn test_order_closed_during_submission_is_a_conflict() {
        let supplier_api = MockServer::start_async().await;
        supplier_api
            .mock_async(|when, then| {
                when.method(POST).path("/v1/orders");
                then.status(200)
                    .json_body(json!({ "order_id": "SUP-9" }))
                    .delay(Duration::from_millis(600));
            })
            .await;

        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let integration = storage.active_integration(d.supplier_id).unwrap().unwrap();
        let endpoint = supplier_api.url("/v1");
        storage
            .update_integration(integration.id, |i| i.api_endpoint = Some(endpoint))
            .unwrap();

        let dispatcher = dispatcher(&storage, InMemoryFtp::new());
        let mut events = dispatcher.events.subscribe();
        let in_flight = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let id = d.id;
            async move { dispatcher.submit(id).await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        dispatcher
            .lifecycle
            .transition(d.id, DropshipStatus::Cancelled, |_| {})
            .unwrap();

        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            EngineError::SubmissionConflict {
                status: DropshipStatus::Cancelled,
                ..
            }
        ));

        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.status, DropshipStatus::Cancelled);
        assert!(stored.supplier_order_id.is_none());
        assert!(stored.notes.last().unwrap().message.contains("while it was being submitted"));

        let mut admin_notice = false;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::SubmissionFailed { retryable: false, .. } = event {
                admin_notice = true;
            }
        }
        assert!(admin_notice);
    }

    #[tokio::test]
    async fn test_non_pending_order_is_skipped() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let dispatcher = dispatcher(&storage, InMemoryFtp::new());
        dispatcher
            .lifecycle
            .transition(d.id, DropshipStatus::Cancelled, |_| {})
            .unwrap();

        assert_eq!(
            dispatcher.submit(d.id).await.unwrap(),
            SubmissionOutcome::Skipped(DropshipStatus::Cancelled)
        );
    }
}
