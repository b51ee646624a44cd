//! HTTP 处理器
//!
//! 事件提交与存活探针。事件校验通过即同步完成首轮扇出后返回 200，
//! 单分支的发送失败不影响响应——它们已落库并进入重试队列。

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::{Value, json};
use tracing::info;

use notify_shared::error::NotifyError;

use crate::dispatcher::deadline_token;
use crate::error::ApiError;
use crate::models::Event;
use crate::state::AppState;

/// 接收事件并同步扇出
///
/// 分发在进程根 token 的子 token 下进行并附加 10 秒 deadline，
/// 不继承请求生命周期：调用方提前断开不应中止扇出。
pub async fn handle_event(
    State(state): State<AppState>,
    payload: Result<Json<Event>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(event) = payload.map_err(|_| ApiError::InvalidPayload)?;

    event.validate().map_err(|e| match e {
        NotifyError::Validation(message) => ApiError::Validation(message),
        other => ApiError::Validation(other.to_string()),
    })?;

    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        title = %event.title,
        "开始处理事件"
    );

    let cancel = deadline_token(&state.shutdown, state.dispatch.dispatch_timeout());
    let results = state.dispatcher.dispatch_event(&cancel, &event).await;

    let success_count = results.iter().filter(|r| r.success).count();
    info!(
        event_id = %event.id,
        success_count,
        total = results.len(),
        "事件分发完成"
    );

    Ok(Json(json!({
        "status": "success",
        "message": "Event received and dispatched successfully"
    })))
}

/// 存活探针：透传存储的 Ping 结果
pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .store
        .ping()
        .await
        .map_err(|e| ApiError::Unhealthy(e.to_string()))?;

    Ok(Json(json!({ "status": "healthy" })))
}
