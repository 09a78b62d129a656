//! Supplier product API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/supplier-products/{id}/cost | PUT | 手动录入成本，入 `pricing` 队列 |

mod handler;

use axum::{Router, routing::put};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/supplier-products/{id}/cost", put(handler::set_cost))
}
