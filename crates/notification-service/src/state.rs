//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use notify_shared::config::DispatchConfig;

use crate::dispatcher::Dispatcher;
use crate::store::NotificationStore;

/// Axum 应用共享状态
///
/// 分发器与存储通过 Arc 在 handler 间共享；
/// shutdown 为进程根取消信号，在线分发从它派生带 deadline 的子 token。
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn NotificationStore>,
    pub dispatch: DispatchConfig,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        store: Arc<dyn NotificationStore>,
        dispatch: DispatchConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            store,
            dispatch,
            shutdown,
        }
    }
}
