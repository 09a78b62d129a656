//! Webhook ingestion
//!
//! Two phases. [`WebhookIngestor::accept`] runs in the request: identify the
//! supplier, verify the signature, parse the event type. Nothing is written
//! there, so a forged event never touches an order or an integration
//! counter. [`WebhookIngestor::process`] runs on the `webhooks` queue and
//! applies the event; it must be safe to run twice for the same delivery.
//! Product events hold the supplier lock, so they never interleave with a
//! catalog sync of the same supplier.

use super::envelope::{OrderUpdate, WebhookEnvelope, WebhookEvent};
use super::signature;
use super::status_map::map_supplier_status;
use crate::core::error::{EngineError, EngineResult};
use crate::dispatch::SupplierLocks;
use crate::events::EventBus;
use crate::lifecycle::{DropshipLifecycle, TransitionOutcome};
use crate::pricing::PriceChangePolicy;
use crate::queue::JobHandler;
use crate::security_log;
use crate::storage::EngineStorage;
use crate::sync::{Reconciliation, SupplierRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{DropshipOrder, DropshipStatus, Supplier, SupplierIntegration};

/// Authenticated event waiting on the `webhooks` queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookJob {
    pub supplier_id: i64,
    pub integration_id: Option<i64>,
    pub event: WebhookEvent,
    pub envelope: WebhookEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// Valid event that changed nothing (replayed status, same price)
    NoChange,
    /// `event_id` seen before
    Duplicate,
    /// Unknown order, unknown status string, or a transition we refuse
    Ignored(String),
}

#[derive(Clone)]
pub struct WebhookIngestor {
    storage: EngineStorage,
    lifecycle: DropshipLifecycle,
    events: EventBus,
    locks: SupplierLocks,
    policy: PriceChangePolicy,
}

impl WebhookIngestor {
    pub fn new(
        storage: EngineStorage,
        lifecycle: DropshipLifecycle,
        events: EventBus,
        locks: SupplierLocks,
        policy: PriceChangePolicy,
    ) -> Self {
        Self {
            storage,
            lifecycle,
            events,
            locks,
            policy,
        }
    }

    /// Authenticate a raw event and turn it into a queue job
    pub fn accept(&self, raw: &Value) -> EngineResult<WebhookJob> {
        let envelope: WebhookEnvelope = serde_json::from_value(raw.clone())
            .map_err(|e| EngineError::Validation(format!("webhook body: {e}")))?;

        let (supplier, integration) = self.identify(&envelope)?;

        if let Some(secret) = integration
            .as_ref()
            .and_then(|i| i.webhook_secret.as_deref())
            .filter(|s| !s.is_empty())
            && !signature::verify_envelope(secret, raw)
        {
            security_log!(
                WARN,
                "webhook_signature_rejected",
                supplier_id = supplier.id,
                event_type = %envelope.event_type
            );
            return Err(EngineError::InvalidSignature);
        }

        let event = WebhookEvent::parse(&envelope.event_type)
            .ok_or_else(|| EngineError::UnsupportedEvent(envelope.event_type.clone()))?;

        Ok(WebhookJob {
            supplier_id: supplier.id,
            integration_id: integration.map(|i| i.id),
            event,
            envelope,
        })
    }

    /// Accept and process in one go
    pub async fn ingest(&self, raw: &Value) -> EngineResult<WebhookOutcome> {
        let job = self.accept(raw)?;
        self.process(&job).await
    }

    /// Apply an authenticated event and update the integration's health
    pub async fn process(&self, job: &WebhookJob) -> EngineResult<WebhookOutcome> {
        if let Some(event_id) = &job.envelope.event_id
            && self.storage.is_webhook_processed(event_id)?
        {
            tracing::info!(event_id = %event_id, supplier_id = job.supplier_id, "Duplicate webhook acknowledged");
            return Ok(WebhookOutcome::Duplicate);
        }

        let result = if job.event.is_order_event() {
            self.apply_order_event(job)
        } else {
            self.apply_product_event(job).await
        };

        let now = shared::util::now_millis();
        match result {
            Ok(outcome) => {
                if let Some(id) = job.integration_id {
                    self.storage.update_integration(id, |i| i.record_success(now))?;
                }
                if let Some(event_id) = &job.envelope.event_id {
                    self.storage.mark_webhook_processed(event_id, now)?;
                }
                tracing::debug!(
                    supplier_id = job.supplier_id,
                    event = %job.event,
                    outcome = ?outcome,
                    "Webhook processed"
                );
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(
                    supplier_id = job.supplier_id,
                    event = %job.event,
                    error = %err,
                    "Webhook processing failed"
                );
                if let Some(id) = job.integration_id {
                    let message = err.to_string();
                    self.storage
                        .update_integration(id, |i| i.record_failure(message, now))?;
                }
                Err(err)
            }
        }
    }

    /// Supplier by explicit id, then name, then embedded API key
    fn identify(
        &self,
        envelope: &WebhookEnvelope,
    ) -> EngineResult<(Supplier, Option<SupplierIntegration>)> {
        let supplier = if let Some(id) = envelope.supplier_id {
            self.storage.get_supplier(id)?
        } else if let Some(name) = envelope.supplier.as_deref() {
            self.storage.find_supplier_by_name(name)?
        } else {
            None
        };

        if let Some(supplier) = supplier {
            let integration = self.storage.active_integration(supplier.id)?;
            return Ok((supplier, integration));
        }

        if let Some(key) = envelope.api_key.as_deref().filter(|k| !k.is_empty())
            && let Some(integration) = self.storage.find_integration_by_api_key(key)?
            && let Some(supplier) = self.storage.get_supplier(integration.supplier_id)?
        {
            return Ok((supplier, Some(integration)));
        }

        security_log!(
            WARN,
            "webhook_unknown_supplier",
            event_type = %envelope.event_type
        );
        Err(EngineError::UnknownSupplier)
    }

    // ========== Order events ==========

    fn apply_order_event(&self, job: &WebhookJob) -> EngineResult<WebhookOutcome> {
        let update = job.envelope.order.as_ref().ok_or_else(|| {
            EngineError::Validation(format!("{} without order body", job.event))
        })?;

        let target = match job.event {
            WebhookEvent::OrderShipped => Some(DropshipStatus::ShippedBySupplier),
            WebhookEvent::OrderDelivered => Some(DropshipStatus::Delivered),
            WebhookEvent::OrderCancelled => Some(DropshipStatus::Cancelled),
            WebhookEvent::OrderRejected => Some(DropshipStatus::RejectedBySupplier),
            _ => update.status.as_deref().and_then(map_supplier_status),
        };
        let Some(target) = target else {
            let raw = update.status.clone().unwrap_or_default();
            tracing::info!(supplier_id = job.supplier_id, status = %raw, "Unknown supplier status dropped");
            return Ok(WebhookOutcome::Ignored(format!("unknown status '{raw}'")));
        };

        let Some(order) = self.locate(job.supplier_id, update)? else {
            tracing::info!(
                supplier_id = job.supplier_id,
                dropship_order_id = ?update.dropship_order_id,
                supplier_order_id = ?update.supplier_order_id,
                "Webhook for unknown order dropped"
            );
            return Ok(WebhookOutcome::Ignored("unknown order".into()));
        };
        if order.supplier_id != job.supplier_id {
            security_log!(
                WARN,
                "webhook_foreign_order",
                supplier_id = job.supplier_id,
                dropship_order_id = order.id
            );
            return Ok(WebhookOutcome::Ignored("order belongs to another supplier".into()));
        }

        let note = match &update.reason {
            Some(reason) => format!("Supplier reported {target}: {reason}"),
            None => format!("Supplier reported {target}"),
        };
        let outcome = self.lifecycle.transition(order.id, target, |d| {
            apply_tracking(d, update);
            if matches!(
                target,
                DropshipStatus::Cancelled | DropshipStatus::RejectedBySupplier
            ) && let Some(reason) = &update.reason
            {
                d.failure_reason = Some(reason.clone());
            }
            d.add_note(note.clone(), shared::util::now_millis());
        });

        match outcome {
            Ok(TransitionOutcome::Applied(_)) => Ok(WebhookOutcome::Applied),
            Ok(TransitionOutcome::Unchanged(current)) => {
                // a repeat may still carry tracking the first one lacked
                let mut candidate = current.clone();
                apply_tracking(&mut candidate, update);
                if candidate.tracking_number != current.tracking_number
                    || candidate.carrier != current.carrier
                    || candidate.estimated_delivery != current.estimated_delivery
                {
                    self.storage
                        .update_dropship_order(order.id, |d| apply_tracking(d, update))?;
                    return Ok(WebhookOutcome::Applied);
                }
                Ok(WebhookOutcome::NoChange)
            }
            Ok(TransitionOutcome::Ignored(current)) => Ok(WebhookOutcome::Ignored(format!(
                "order is {}",
                current.status
            ))),
            Err(EngineError::IllegalTransition { from, to }) => {
                tracing::warn!(dropship_order_id = order.id, %from, %to, "Supplier reported an illegal transition");
                Ok(WebhookOutcome::Ignored(format!("illegal transition {from} -> {to}")))
            }
            Err(e) => Err(e),
        }
    }

    fn locate(&self, supplier_id: i64, update: &OrderUpdate) -> EngineResult<Option<DropshipOrder>> {
        if let Some(id) = update.dropship_order_id
            && let Some(order) = self.storage.get_dropship_order(id)?
        {
            return Ok(Some(order));
        }
        match update.supplier_order_id.as_deref() {
            Some(external) => Ok(self
                .storage
                .find_dropship_by_supplier_order_id(supplier_id, external)?),
            None => Ok(None),
        }
    }

    // ========== Product events ==========

    async fn apply_product_event(&self, job: &WebhookJob) -> EngineResult<WebhookOutcome> {
        // the rows below are read and written back whole
        let _guard = self.locks.acquire(job.supplier_id).await;
        let body = job.envelope.product_record().ok_or_else(|| {
            EngineError::Validation(format!("{} without product body", job.event))
        })?;
        let record = match job.event {
            WebhookEvent::PriceChanged => SupplierRecord {
                stock: None,
                ..body.clone()
            },
            WebhookEvent::StockChanged => SupplierRecord {
                name: None,
                price: None,
                ..body.clone()
            },
            _ => body.clone(),
        };

        let existing = self
            .storage
            .find_supplier_product(job.supplier_id, record.sku.trim())?;
        if existing.is_none() && job.event != WebhookEvent::ProductUpdated {
            tracing::info!(supplier_id = job.supplier_id, sku = %record.sku, "Webhook for unknown sku dropped");
            return Ok(WebhookOutcome::Ignored(format!("unknown sku {}", record.sku)));
        }
        let mappings = match &existing {
            Some(sp) => self.storage.mappings_for_supplier_product(sp.id)?,
            None => Vec::new(),
        };

        let now = shared::util::now_millis();
        let mut diff = Reconciliation::default();
        match (job.event, &existing) {
            (WebhookEvent::ProductDiscontinued, Some(sp)) => diff.deactivate(sp, now),
            _ => diff.apply_record(
                job.supplier_id,
                existing.as_ref(),
                &mappings,
                &record,
                &self.policy,
                now,
            ),
        }
        if !diff.report.errors.is_empty() {
            return Err(EngineError::Validation(diff.report.errors.join("; ")));
        }
        if diff.is_empty() {
            return Ok(WebhookOutcome::NoChange);
        }

        self.storage.apply_sync_batch(&diff.writes, now)?;
        for event in diff.events {
            self.events.emit(event);
        }
        tracing::info!(
            supplier_id = job.supplier_id,
            sku = %record.sku,
            event = %job.event,
            "Supplier product updated from webhook"
        );
        Ok(WebhookOutcome::Applied)
    }
}

fn apply_tracking(order: &mut DropshipOrder, update: &OrderUpdate) {
    if let Some(v) = &update.tracking_number {
        order.tracking_number = Some(v.clone());
    }
    if let Some(v) = &update.carrier {
        order.carrier = Some(v.clone());
    }
    if let Some(v) = &update.estimated_delivery {
        order.estimated_delivery = Some(v.clone());
    }
    if order.supplier_order_id.is_none()
        && let Some(v) = &update.supplier_order_id
    {
        order.supplier_order_id = Some(v.clone());
    }
}

#[async_trait]
impl JobHandler<WebhookJob> for WebhookIngestor {
    async fn handle(&self, job: &WebhookJob) -> EngineResult<()> {
        self.process(job).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_catalog, seed_decomposed_order, test_storage};
    use serde_json::json;

    fn ingestor(storage: &EngineStorage) -> WebhookIngestor {
        ingestor_with_locks(storage, SupplierLocks::new())
    }

    fn ingestor_with_locks(storage: &EngineStorage, locks: SupplierLocks) -> WebhookIngestor {
        let events = EventBus::default();
        WebhookIngestor::new(
            storage.clone(),
            DropshipLifecycle::new(storage.clone(), events.clone()),
            events,
            locks,
            PriceChangePolicy::default(),
        )
    }

    fn signed(supplier_id: i64, mut body: Value) -> Value {
        body["supplier_id"] = json!(supplier_id);
        signature::sign_envelope(&format!("secret-{supplier_id}"), &mut body);
        body
    }

    #[tokio::test]
    async fn test_status_event_is_idempotent() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let ingestor = ingestor(&storage);
        let body = signed(
            d.supplier_id,
            json!({
                "event_type": "order.status_changed",
                "order": {"dropship_order_id": d.id, "status": "confirmed"}
            }),
        );

        assert_eq!(ingestor.ingest(&body).await.unwrap(), WebhookOutcome::Applied);
        let after_first = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(ingestor.ingest(&body).await.unwrap(), WebhookOutcome::NoChange);
        let after_second = storage.get_dropship_order(d.id).unwrap().unwrap();

        assert_eq!(after_first.status, DropshipStatus::ConfirmedBySupplier);
        assert_eq!(after_second.status, DropshipStatus::ConfirmedBySupplier);
        assert_eq!(after_first.notes.len(), after_second.notes.len());
    }

    #[tokio::test]
    async fn test_event_id_replay_guard() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let ingestor = ingestor(&storage);
        let body = signed(
            d.supplier_id,
            json!({
                "event_id": "evt-1",
                "event_type": "order.shipped",
                "order": {"external_order_id": d.id.to_string(), "tracking_number": "1Z"}
            }),
        );

        assert_eq!(ingestor.ingest(&body).await.unwrap(), WebhookOutcome::Applied);
        assert_eq!(ingestor.ingest(&body).await.unwrap(), WebhookOutcome::Duplicate);
        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.status, DropshipStatus::ShippedBySupplier);
        assert_eq!(stored.tracking_number.as_deref(), Some("1Z"));
    }

    #[tokio::test]
    async fn test_forged_signature_changes_nothing() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let integration = storage.active_integration(d.supplier_id).unwrap().unwrap();
        let body = json!({
            "supplier_id": d.supplier_id,
            "event_type": "order.cancelled",
            "order": {"dropship_order_id": d.id},
            "signature": "00".repeat(32)
        });

        let err = ingestor(&storage).ingest(&body).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidSignature));
        assert_eq!(
            storage.get_dropship_order(d.id).unwrap().unwrap().status,
            DropshipStatus::Pending
        );
        let after = storage.get_integration(integration.id).unwrap().unwrap();
        assert_eq!(after.consecutive_failures, integration.consecutive_failures);
    }

    #[tokio::test]
    async fn test_unknown_supplier_and_status() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let ingestor = ingestor(&storage);

        let err = ingestor
            .ingest(&json!({"event_type": "order.shipped", "api_key": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSupplier));

        let body = signed(
            d.supplier_id,
            json!({
                "event_type": "order.status_changed",
                "order": {"dropship_order_id": d.id, "status": "teleported"}
            }),
        );
        assert!(matches!(ingestor.ingest(&body).await.unwrap(), WebhookOutcome::Ignored(_)));
    }

    #[tokio::test]
    async fn test_terminal_order_is_not_regressed() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let ingestor = ingestor(&storage);
        let cancel = signed(
            d.supplier_id,
            json!({"event_type": "order.cancelled", "order": {"dropship_order_id": d.id, "reason": "out of stock"}}),
        );
        let ship = signed(
            d.supplier_id,
            json!({"event_type": "order.shipped", "order": {"dropship_order_id": d.id}}),
        );

        ingestor.ingest(&cancel).await.unwrap();
        assert!(matches!(ingestor.ingest(&ship).await.unwrap(), WebhookOutcome::Ignored(_)));
        let stored = storage.get_dropship_order(d.id).unwrap().unwrap();
        assert_eq!(stored.status, DropshipStatus::Cancelled);
        assert_eq!(stored.failure_reason.as_deref(), Some("out of stock"));
    }

    #[tokio::test]
    async fn test_price_event_matched_by_api_key() {
        let storage = test_storage();
        let seeded = seed_catalog(&storage, 1);
        let sp = &seeded.supplier_products[0];
        let mut body = json!({
            "event_type": "product.price_changed",
            "api_key": seeded.integration.api_key.clone().unwrap(),
            "product": {"sku": sp.supplier_sku, "price": "13.00", "stock": 1}
        });
        signature::sign_envelope(&format!("secret-{}", seeded.supplier.id), &mut body);

        assert_eq!(ingestor(&storage).ingest(&body).await.unwrap(), WebhookOutcome::Applied);

        let stored = storage.get_supplier_product(sp.id).unwrap().unwrap();
        assert_eq!(stored.price, 1300);
        // stock is not part of a price event
        assert_eq!(stored.stock_quantity, sp.stock_quantity);
        // 30% swing is held for approval
        let mapping = storage.get_mapping(seeded.mappings[0].id).unwrap().unwrap();
        assert!(!mapping.auto_update_price);
        assert_eq!(mapping.pending_price_change.unwrap().new_price, 1300);
        let product = storage.get_product(seeded.products[0].id).unwrap().unwrap();
        assert_eq!(product.price, 1500);
        let integration = storage.get_integration(seeded.integration.id).unwrap().unwrap();
        assert!(integration.last_successful_sync.is_some());
    }

    #[tokio::test]
    async fn test_product_event_waits_for_running_sync() {
        let storage = test_storage();
        let seeded = seed_catalog(&storage, 1);
        let sp = seeded.supplier_products[0].clone();
        let locks = SupplierLocks::new();
        let ingestor = ingestor_with_locks(&storage, locks.clone());
        let mut body = json!({
            "event_type": "product.stock_changed",
            "supplier_id": seeded.supplier.id,
            "product": {"sku": sp.supplier_sku, "stock": 2}
        });
        signature::sign_envelope(&format!("secret-{}", seeded.supplier.id), &mut body);

        // a sync of the same supplier is mid-flight
        let sync_guard = locks.acquire(seeded.supplier.id).await;
        let pending = tokio::spawn(async move { ingestor.ingest(&body).await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(
            storage.get_supplier_product(sp.id).unwrap().unwrap().stock_quantity,
            sp.stock_quantity
        );

        drop(sync_guard);
        assert_eq!(pending.await.unwrap().unwrap(), WebhookOutcome::Applied);
        assert_eq!(
            storage.get_supplier_product(sp.id).unwrap().unwrap().stock_quantity,
            2
        );
    }
}
