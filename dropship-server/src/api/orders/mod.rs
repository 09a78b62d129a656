//! Order API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/orders/{id}/decompose | POST | 拆分已支付订单 |
//! | /api/orders/{id}/dropship | GET | 订单的全部子订单 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{id}/decompose", post(handler::decompose))
        .route("/{id}/dropship", get(handler::list_dropship))
}
