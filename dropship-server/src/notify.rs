//! Outbound notifications
//!
//! Mail delivery itself is an external collaborator behind [`Notifier`].
//! [`NotificationWorker`] turns engine events into messages for admins
//! (permanent failures, held price changes, fatal submission errors) and
//! customers (shipped, delivered).

use crate::events::EngineEvent;
use crate::storage::EngineStorage;
use async_trait::async_trait;
use serde::Serialize;
use shared::models::DropshipStatus;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PermanentFailure,
    PriceHold,
    SubmissionFailure,
    OrderShipped,
    OrderDelivered,
    /// Order sheet sent to a supplier over the email integration
    SupplierOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of a mail server
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        tracing::info!(
            kind = ?notification.kind,
            recipient = %notification.recipient,
            subject = %notification.subject,
            "Notification sent"
        );
        Ok(())
    }
}

pub struct NotificationWorker {
    storage: EngineStorage,
    notifier: Arc<dyn Notifier>,
    admin_email: String,
}

impl NotificationWorker {
    pub fn new(storage: EngineStorage, notifier: Arc<dyn Notifier>, admin_email: impl Into<String>) -> Self {
        Self {
            storage,
            notifier,
            admin_email: admin_email.into(),
        }
    }

    /// Message for an event, if it warrants one
    pub fn build(&self, event: &EngineEvent) -> anyhow::Result<Option<Notification>> {
        let notification = match event {
            EngineEvent::DropshipPermanentlyFailed {
                dropship_order_id,
                order_id,
                supplier_id,
                reason,
            } => Some(Notification {
                kind: NotificationKind::PermanentFailure,
                recipient: self.admin_email.clone(),
                subject: format!("Dropship order {dropship_order_id} cancelled after retries"),
                body: format!(
                    "Dropship order {dropship_order_id} (order {order_id}, supplier {supplier_id}) \
                     exhausted its retries and was cancelled.\nReason: {reason}"
                ),
            }),
            EngineEvent::PriceChangeHeld {
                mapping_id,
                product_id,
                old_price,
                new_price,
                change_percent,
            } => Some(Notification {
                kind: NotificationKind::PriceHold,
                recipient: self.admin_email.clone(),
                subject: format!("Price change on product {product_id} needs approval"),
                body: format!(
                    "Supplier cost moved from {old_price} to {new_price} ({change_percent}%). \
                     Automatic price updates for mapping {mapping_id} are paused until approved."
                ),
            }),
            EngineEvent::SubmissionFailed {
                dropship_order_id,
                supplier_id,
                error,
                retryable: false,
            } => Some(Notification {
                kind: NotificationKind::SubmissionFailure,
                recipient: self.admin_email.clone(),
                subject: format!("Dropship order {dropship_order_id} could not be submitted"),
                body: format!("Supplier {supplier_id} submission failed: {error}"),
            }),
            EngineEvent::DropshipStatusChanged {
                dropship_order_id,
                to: to @ (DropshipStatus::ShippedBySupplier | DropshipStatus::Delivered),
                ..
            } => {
                let Some(dropship) = self.storage.get_dropship_order(*dropship_order_id)? else {
                    return Ok(None);
                };
                let (kind, subject) = if *to == DropshipStatus::Delivered {
                    (NotificationKind::OrderDelivered, "Your order has been delivered")
                } else {
                    (NotificationKind::OrderShipped, "Your order has shipped")
                };
                let mut body = format!("Hi {},\n\n{subject}.", dropship.customer.name);
                if let Some(tracking) = &dropship.tracking_number {
                    body.push_str(&format!(
                        "\nTracking: {tracking} ({})",
                        dropship.carrier.as_deref().unwrap_or("carrier unknown")
                    ));
                }
                Some(Notification {
                    kind,
                    recipient: dropship.customer.email,
                    subject: subject.to_string(),
                    body,
                })
            }
            _ => None,
        };
        Ok(notification)
    }

    pub async fn run(self, mut rx: mpsc::Receiver<Arc<EngineEvent>>, shutdown: CancellationToken) {
        tracing::info!("Notification worker started");
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            match self.build(&event) {
                Ok(Some(notification)) => {
                    let kind = notification.kind;
                    if let Err(e) = self.notifier.send(notification).await {
                        tracing::warn!(kind = ?kind, error = %e, "Notification delivery failed");
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(event = event.kind(), error = %e, "Failed to build notification"),
            }
        }
        tracing::info!("Notification worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_decomposed_order, test_storage};

    #[test]
    fn test_permanent_failure_goes_to_admin() {
        let worker = NotificationWorker::new(test_storage(), Arc::new(LogNotifier), "ops@example.com");
        let n = worker
            .build(&EngineEvent::DropshipPermanentlyFailed {
                dropship_order_id: 4,
                order_id: 1,
                supplier_id: 2,
                reason: "supplier down".into(),
            })
            .unwrap()
            .unwrap();
        assert_eq!(n.kind, NotificationKind::PermanentFailure);
        assert_eq!(n.recipient, "ops@example.com");
        assert!(n.body.contains("supplier down"));
    }

    #[test]
    fn test_shipped_goes_to_customer_with_tracking() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = storage
            .update_dropship_order(dropship[0].id, |d| {
                d.tracking_number = Some("1Z999".into());
                d.carrier = Some("UPS".into());
            })
            .unwrap();

        let worker = NotificationWorker::new(storage, Arc::new(LogNotifier), "ops@example.com");
        let n = worker
            .build(&EngineEvent::DropshipStatusChanged {
                dropship_order_id: d.id,
                order_id: d.order_id,
                supplier_id: d.supplier_id,
                from: DropshipStatus::Processing,
                to: DropshipStatus::ShippedBySupplier,
            })
            .unwrap()
            .unwrap();
        assert_eq!(n.kind, NotificationKind::OrderShipped);
        assert_eq!(n.recipient, d.customer.email);
        assert!(n.body.contains("1Z999 (UPS)"));
    }

    #[test]
    fn test_retryable_submission_failure_is_silent() {
        let worker = NotificationWorker::new(test_storage(), Arc::new(LogNotifier), "ops@example.com");
        let n = worker
            .build(&EngineEvent::SubmissionFailed {
                dropship_order_id: 1,
                supplier_id: 1,
                error: "503".into(),
                retryable: true,
            })
            .unwrap();
        assert!(n.is_none());
    }
}
