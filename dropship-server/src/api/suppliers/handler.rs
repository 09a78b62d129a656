//! Supplier sync API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use http::StatusCode;

use crate::core::{EngineError, ServerState};
use crate::sync::{SyncJob, SyncReport};
use crate::utils::{ApiResponse, AppError, AppResult};

fn ensure_supplier(state: &ServerState, id: i64) -> AppResult<()> {
    state
        .storage
        .get_supplier(id)
        .map_err(EngineError::from)?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found(format!("Supplier {id}")))
}

/// POST /api/suppliers/{id}/sync - 触发目录同步
pub async fn trigger_sync(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<(StatusCode, Json<ApiResponse<()>>)> {
    ensure_supplier(&state, id)?;
    state.queues.sync.enqueue(SyncJob { supplier_id: id }).await?;
    tracing::info!(supplier_id = id, "Catalog sync requested");
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok())))
}

/// GET /api/suppliers/{id}/sync - 最近一次同步报告
pub async fn last_report(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<SyncReport>>> {
    ensure_supplier(&state, id)?;
    let report = state
        .sync
        .last_report(id)?
        .ok_or_else(|| AppError::not_found(format!("Sync report for supplier {id}")))?;
    Ok(Json(ApiResponse::success(report)))
}
