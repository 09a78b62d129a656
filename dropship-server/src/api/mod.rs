//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`webhooks`] - 供应商 Webhook 入口
//! - [`orders`] - 订单拆分与子订单查询
//! - [`dropship`] - 子订单手动重试
//! - [`suppliers`] - 目录同步
//! - [`mappings`] - 价格变动审批
//! - [`supplier_products`] - 手动录入供应商成本

pub mod dropship;
pub mod health;
pub mod mappings;
pub mod orders;
pub mod supplier_products;
pub mod suppliers;
pub mod webhooks;

use axum::Router;
use http::{HeaderName, HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::ServerState;

pub use shared::error::{ApiResponse, AppError, AppResult};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// 所有路由 (无中间件、无状态)
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(health::router())
        .merge(webhooks::router())
        .merge(orders::router())
        .merge(dropship::router())
        .merge(suppliers::router())
        .merge(mappings::router())
        .merge(supplier_products::router())
}

/// 完整应用：路由 + 中间件 + 状态
pub fn build_app(state: ServerState) -> Router {
    build_router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            XRequestId,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .with_state(state)
}
