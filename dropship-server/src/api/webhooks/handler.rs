//! Supplier webhook handler

use axum::{Json, extract::State};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::core::ServerState;
use crate::dispatch::transport::SIGNATURE_HEADER;
use crate::utils::{ApiResponse, AppResult};
use crate::webhook::signature::SIGNATURE_FIELD;

#[derive(Debug, Serialize)]
pub struct WebhookAccepted {
    pub supplier_id: i64,
    pub event: String,
}

/// POST /api/webhooks/suppliers - 接收供应商事件
///
/// 签名可放在 body 的 `signature` 字段，也可放在 `X-Dropship-Signature` 头。
/// 伪造签名返回 401，未知供应商返回 404，两者都不会写入任何数据。
pub async fn receive(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> AppResult<(StatusCode, Json<ApiResponse<WebhookAccepted>>)> {
    if let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        && let Value::Object(map) = &mut body
        && !map.contains_key(SIGNATURE_FIELD)
    {
        map.insert(SIGNATURE_FIELD.into(), Value::String(signature.to_string()));
    }

    let job = state.webhooks.accept(&body)?;
    let accepted = WebhookAccepted {
        supplier_id: job.supplier_id,
        event: job.event.to_string(),
    };
    state.queues.webhooks.enqueue(job).await?;

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(accepted))))
}
