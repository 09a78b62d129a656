use super::SubmissionReceipt;
use crate::core::error::EngineResult;
use crate::dispatch::payload::OutboundOrderPayload;
use crate::notify::{Notification, NotificationKind, Notifier};
use std::sync::Arc;

/// Order sheet mailed to the supplier. Delivery is confirmed out of band,
/// so the send is spawned and the order counts as sent right away.
#[derive(Debug, Clone)]
pub struct EmailTransport {
    pub recipient: String,
}

impl EmailTransport {
    pub fn submit(
        &self,
        notifier: Arc<dyn Notifier>,
        payload: &OutboundOrderPayload,
    ) -> EngineResult<SubmissionReceipt> {
        let csv = payload.to_csv()?;
        let notification = Notification {
            kind: NotificationKind::SupplierOrder,
            recipient: self.recipient.clone(),
            subject: format!("New order {}", payload.external_order_id),
            body: String::from_utf8_lossy(&csv).into_owned(),
        };
        let order_id = payload.external_order_id.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send(notification).await {
                tracing::warn!(dropship_order_id = %order_id, error = %e, "Supplier order email failed");
            }
        });
        Ok(SubmissionReceipt {
            supplier_order_id: None,
            detail: format!("emailed to {}", self.recipient),
        })
    }
}
