//! 通知渠道适配器
//!
//! 定义渠道适配器 trait 并提供各渠道的具体实现。
//!
//! ## 支持的渠道
//!
//! - **sms**: 短信（服务商 HTTP API）
//! - **email**: 邮件
//! - **push**: App 推送
//!
//! 适配器只负责单次发送，不读写持久化状态；状态迁移全部由分发器处理。

mod email;
mod push;
mod sms;

pub use email::EmailAdapter;
pub use push::PushAdapter;
pub use sms::SmsAdapter;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::{DispatchResult, Notification};

/// 渠道适配器 trait
///
/// 实现应当是无状态的（初始化期配置除外），便于并发调用。
/// 收到取消信号后必须尽快返回 `success=false, error="context cancelled"`；
/// 收件人格式非法时返回带描述的失败结果而非 panic。
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 发送单条通知
    async fn send(
        &self,
        cancel: &CancellationToken,
        notification: &Notification,
    ) -> DispatchResult;
}
