//! Dropship order API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/dropship/{id}/retry | POST | 手动重试 |

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/dropship/{id}/retry", post(handler::retry))
}
