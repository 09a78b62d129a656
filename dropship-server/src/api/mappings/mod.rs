//! Price approval API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/mappings/pending-prices | GET | 待审批价格变动 |
//! | /api/mappings/{id}/approve-price | POST | 应用并恢复自动调价 |
//! | /api/mappings/{id}/reject-price | POST | 丢弃待审批变动 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/mappings", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/pending-prices", get(handler::pending))
        .route("/{id}/approve-price", post(handler::approve))
        .route("/{id}/reject-price", post(handler::reject))
}
