use super::SubmissionReceipt;
use crate::core::error::{EngineError, EngineResult};
use crate::dispatch::payload::OutboundOrderPayload;
use crate::webhook::signature;

pub const SIGNATURE_HEADER: &str = "X-Dropship-Signature";

/// Signed push to a supplier-hosted URL
#[derive(Debug, Clone)]
pub struct WebhookTransport {
    pub url: String,
    pub secret: String,
}

impl WebhookTransport {
    pub async fn submit(
        &self,
        client: &reqwest::Client,
        payload: &OutboundOrderPayload,
    ) -> EngineResult<SubmissionReceipt> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| EngineError::Validation(format!("payload encode: {e}")))?;
        let signature = signature::sign(&self.secret, &body);

        let response = client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transport(format!(
                "webhook {} returned {status}",
                self.url
            )));
        }
        Ok(SubmissionReceipt {
            supplier_order_id: None,
            detail: format!("delivered to webhook ({status})"),
        })
    }
}
