//! Supplier webhook API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/webhooks/suppliers | POST | 验签后入 `webhooks` 队列，返回 202 |

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/webhooks/suppliers", post(handler::receive))
}
