//! Order API Handlers

use axum::{
    Json,
    extract::{Path, State},
};

use crate::core::{EngineError, ServerState};
use crate::decomposition::Decomposition;
use crate::utils::{ApiResponse, AppError, AppResult};
use shared::models::DropshipOrder;

/// POST /api/orders/{id}/decompose - 按供应商拆分订单
pub async fn decompose(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Decomposition>>> {
    let decomposition = state.decomposer.decompose(id)?;
    Ok(Json(ApiResponse::success(decomposition)))
}

/// GET /api/orders/{id}/dropship - 获取订单的子订单
pub async fn list_dropship(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<DropshipOrder>>>> {
    state
        .storage
        .get_order(id)
        .map_err(EngineError::from)?
        .ok_or_else(|| AppError::not_found(format!("Order {id}")))?;
    let orders = state
        .storage
        .dropship_orders_for_order(id)
        .map_err(EngineError::from)?;
    Ok(Json(ApiResponse::success(orders)))
}
