//! Supplier product API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use http::StatusCode;
use serde::Deserialize;

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult};

#[derive(Debug, Deserialize)]
pub struct CostUpdate {
    /// Minor units
    pub price: i64,
}

/// PUT /api/supplier-products/{id}/cost - 手动录入供应商成本
///
/// 成本写入后异步重算所有映射的零售价，返回 202。
pub async fn set_cost(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<CostUpdate>,
) -> AppResult<(StatusCode, Json<ApiResponse<()>>)> {
    if let Some(job) = state.pricing.set_supplier_cost(id, payload.price)? {
        state.queues.pricing.enqueue(job).await?;
        return Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok())));
    }
    Ok((StatusCode::OK, Json(ApiResponse::ok())))
}
