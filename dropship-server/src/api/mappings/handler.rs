//! Price approval API Handlers

use axum::{
    Json,
    extract::{Path, State},
};

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult};
use shared::models::ProductSupplierMapping;

/// GET /api/mappings/pending-prices
pub async fn pending(
    State(state): State<ServerState>,
) -> AppResult<Json<ApiResponse<Vec<ProductSupplierMapping>>>> {
    Ok(Json(ApiResponse::success(state.pricing.pending_changes()?)))
}

/// POST /api/mappings/{id}/approve-price
pub async fn approve(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<ProductSupplierMapping>>> {
    Ok(Json(ApiResponse::success(state.pricing.approve(id)?)))
}

/// POST /api/mappings/{id}/reject-price
pub async fn reject(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<ProductSupplierMapping>>> {
    Ok(Json(ApiResponse::success(state.pricing.reject(id)?)))
}
