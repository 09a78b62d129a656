//! Dropship order API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use crate::core::ServerState;
use crate::dispatch::SubmissionOutcome;
use crate::retry::RetryOutcome;
use crate::utils::{ApiResponse, AppResult};
use shared::models::DropshipOrder;

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    /// resubmitted | skipped | rescheduled | permanently_failed
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_in_secs: Option<u64>,
    pub order: DropshipOrder,
}

/// POST /api/dropship/{id}/retry - 手动重试子订单
///
/// 资格检查和库存预检失败时返回对应错误码，不改变子订单状态。
pub async fn retry(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<RetryResponse>>> {
    let outcome = state.retry.retry(id).await?;
    let order = state.lifecycle.load(id)?;

    let (outcome, next_attempt_in_secs) = match outcome {
        RetryOutcome::Resubmitted(SubmissionOutcome::Submitted { .. }) => ("resubmitted", None),
        RetryOutcome::Resubmitted(SubmissionOutcome::Skipped(_)) => ("skipped", None),
        RetryOutcome::Rescheduled { delay, .. } => ("rescheduled", Some(delay.as_secs())),
        RetryOutcome::PermanentlyFailed => ("permanently_failed", None),
    };
    Ok(Json(ApiResponse::success(RetryResponse {
        outcome,
        next_attempt_in_secs,
        order,
    })))
}
