//! App 推送通知渠道
//!
//! 当前为模拟实现（如 FCM、APNs），生产环境需要接入真实的推送服务。

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::ChannelAdapter;
use crate::models::{DispatchResult, Notification};

/// App 推送通知渠道
pub struct PushAdapter {
    /// 模拟投递延迟
    latency: Duration,
}

impl PushAdapter {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(120),
        }
    }
}

impl Default for PushAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for PushAdapter {
    fn name(&self) -> &str {
        "push"
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        notification: &Notification,
    ) -> DispatchResult {
        if notification.recipient.trim().is_empty() {
            return DispatchResult::failure(&notification.id, "empty device token");
        }

        tokio::select! {
            _ = tokio::time::sleep(self.latency) => {}
            _ = cancel.cancelled() => {
                return DispatchResult::cancelled(&notification.id);
            }
        }

        info!(
            notification_id = %notification.id,
            device = %notification.recipient,
            "推送发送成功"
        );

        DispatchResult::success(&notification.id)
    }
}
