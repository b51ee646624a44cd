//! HTTP 边界错误
//!
//! 面向客户端的错误表达。渠道发送失败不属于此类——
//! 它们驱动重试状态机，不向 HTTP 调用方传播。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// API 错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 请求体不是合法 JSON
    #[error("invalid JSON payload")]
    InvalidPayload,

    /// 必填字段校验失败，错误信息面向客户端
    #[error("{0}")]
    Validation(String),

    /// 存储存活检查失败
    #[error("{0}")]
    Unhealthy(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidPayload | Self::Validation(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            Self::Unhealthy(error) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "error": error })),
            )
                .into_response(),
        }
    }
}
