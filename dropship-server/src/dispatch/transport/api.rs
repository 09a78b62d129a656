use super::SubmissionReceipt;
use crate::core::error::{EngineError, EngineResult};
use crate::dispatch::payload::OutboundOrderPayload;
use reqwest::StatusCode;
use serde_json::Value;

/// REST submission: `POST {endpoint}/orders` with bearer auth
#[derive(Debug, Clone)]
pub struct ApiTransport {
    pub endpoint: String,
    pub api_key: String,
}

impl ApiTransport {
    pub async fn submit(
        &self,
        client: &reqwest::Client,
        payload: &OutboundOrderPayload,
    ) -> EngineResult<SubmissionReceipt> {
        let url = format!("{}/orders", self.endpoint.trim_end_matches('/'));
        let response = client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(EngineError::Configuration(format!(
                "supplier API rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Transport(format!(
                "POST {url} returned {status}: {}",
                truncate(&body, 200)
            )));
        }

        let body: Option<Value> = response.json().await.ok();
        let supplier_order_id = body.as_ref().and_then(extract_order_id);
        Ok(SubmissionReceipt {
            detail: match &supplier_order_id {
                Some(id) => format!("accepted by API as {id}"),
                None => "accepted by API without an order id".into(),
            },
            supplier_order_id,
        })
    }
}

fn extract_order_id(body: &Value) -> Option<String> {
    match body.get("order_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
