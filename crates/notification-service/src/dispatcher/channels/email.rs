//! 邮件通知渠道
//!
//! 当前为模拟实现，保留真实 SMTP 投递的延迟特征，
//! 生产环境需要接入真实的邮件服务。

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::ChannelAdapter;
use crate::models::{DispatchResult, Notification};

/// 邮件通知渠道
pub struct EmailAdapter {
    /// 模拟投递延迟
    latency: Duration,
}

impl EmailAdapter {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(150),
        }
    }
}

impl Default for EmailAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        notification: &Notification,
    ) -> DispatchResult {
        if !notification.recipient.contains('@') {
            return DispatchResult::failure(
                &notification.id,
                format!("invalid email recipient: {}", notification.recipient),
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(self.latency) => {}
            _ = cancel.cancelled() => {
                return DispatchResult::cancelled(&notification.id);
            }
        }

        info!(
            notification_id = %notification.id,
            recipient = %notification.recipient,
            "邮件发送成功"
        );

        DispatchResult::success(&notification.id)
    }
}
