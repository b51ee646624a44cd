//! 路由配置模块
//!
//! 定义 REST API 端点的路由映射

use axum::{
    Router,
    routing::{get, post},
};

use crate::{handlers, state::AppState};

/// 构建服务路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(handlers::handle_event))
        .route("/health", get(handlers::health_check))
}
