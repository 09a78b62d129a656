//! Supplier sync API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/suppliers/{id}/sync | POST | 入 `sync` 队列 |
//! | /api/suppliers/{id}/sync | GET | 最近一次同步报告 |

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route(
        "/api/suppliers/{id}/sync",
        post(handler::trigger_sync).get(handler::last_report),
    )
}
