//! 通知分发器
//!
//! 把事件扇出为 (渠道, 收件人) 粒度的通知并驱动发送。
//!
//! ## 设计说明
//!
//! - **并发扇出**：各分支独立发送，互不影响，全部结束后统一返回
//! - **未知渠道跳过**：渠道可灰度上线，未注册的渠道名只记日志
//! - **单一分类点**：在线分发与重试 worker 共用 `settle_attempt`，
//!   同一种失败在两条路径上产生完全相同的状态迁移

pub mod channels;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use notify_shared::config::{AppConfig, DispatchConfig};

use crate::dispatcher::channels::{ChannelAdapter, EmailAdapter, PushAdapter, SmsAdapter};
use crate::models::{DispatchResult, Event, Notification, NotificationStatus};
use crate::store::NotificationStore;

/// 尝试计数写入失败时的保守重排间隔（秒）
///
/// 计数不可用时宁可延迟重试，也不能让记录丢出重试环。
const INCREMENT_FAILURE_REQUEUE_SECS: i64 = 600;

/// 通知分发器
///
/// 渠道表在构造期填充，此后只读；存储是唯一共享可变资源。
pub struct Dispatcher {
    channels: HashMap<String, Arc<dyn ChannelAdapter>>,
    store: Arc<dyn NotificationStore>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// 创建空分发器，渠道由调用方注册
    pub fn new(store: Arc<dyn NotificationStore>, config: DispatchConfig) -> Self {
        Self {
            channels: HashMap::new(),
            store,
            config,
        }
    }

    /// 创建并注册全部内置渠道（sms / email / push）
    pub fn with_default_channels(store: Arc<dyn NotificationStore>, config: &AppConfig) -> Self {
        let mut dispatcher = Self::new(store, config.dispatch.clone());
        dispatcher.register_channel("sms", Arc::new(SmsAdapter::new(config.sms.clone())));
        dispatcher.register_channel("email", Arc::new(EmailAdapter::new()));
        dispatcher.register_channel("push", Arc::new(PushAdapter::new()));
        dispatcher
    }

    /// 按符号名注册渠道适配器
    pub fn register_channel(&mut self, name: impl Into<String>, adapter: Arc<dyn ChannelAdapter>) {
        let name = name.into();
        info!(channel = %name, adapter = adapter.name(), "注册通知渠道");
        self.channels.insert(name, adapter);
    }

    /// 已注册的渠道名列表
    pub fn registered_channels(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    /// 把事件扇出为逐条通知并发送
    ///
    /// 对每个已注册渠道 × 每个收件人并发执行：创建 pending 记录、落库、
    /// 调用适配器、按结果分类。所有分支结束（或被取消）后才返回。
    pub async fn dispatch_event(
        &self,
        cancel: &CancellationToken,
        event: &Event,
    ) -> Vec<DispatchResult> {
        debug!(
            event_id = %event.id,
            channels = event.channels.len(),
            recipients = event.recipients.len(),
            "开始分发事件"
        );

        let mut branches = Vec::new();
        for channel in &event.channels {
            let Some(adapter) = self.channels.get(channel) else {
                warn!(event_id = %event.id, channel = %channel, "未知渠道，跳过");
                continue;
            };

            for recipient in &event.recipients {
                let adapter = adapter.clone();
                branches.push(async move {
                    let notification =
                        Notification::new(event, recipient.as_str(), channel.as_str());

                    // 写入失败只记日志，发送照常进行（尽力而为的延续策略）
                    if let Err(e) = self.store.save_notification(&notification).await {
                        error!(
                            notification_id = %notification.id,
                            error = %e,
                            "通知记录写入失败"
                        );
                    }

                    self.attempt(cancel, adapter.as_ref(), &notification).await
                });
            }
        }

        join_all(branches).await
    }

    /// 重发单条已有通知（重试路径）
    ///
    /// 记录已在存储中，不再创建；渠道未注册时按发送失败分类，
    /// 让已下线渠道上的遗留记录自然走向永久失败。
    pub async fn dispatch_notification(
        &self,
        cancel: &CancellationToken,
        notification: &Notification,
    ) -> DispatchResult {
        match self.channels.get(&notification.channel) {
            Some(adapter) => {
                let adapter = adapter.clone();
                self.attempt(cancel, adapter.as_ref(), notification).await
            }
            None => {
                warn!(
                    notification_id = %notification.id,
                    channel = %notification.channel,
                    "通知指向未注册渠道"
                );
                let result = DispatchResult::failure(
                    &notification.id,
                    format!("unknown channel: {}", notification.channel),
                );
                self.settle_attempt(notification, &result).await;
                result
            }
        }
    }

    /// 执行一次发送并结算
    async fn attempt(
        &self,
        cancel: &CancellationToken,
        adapter: &dyn ChannelAdapter,
        notification: &Notification,
    ) -> DispatchResult {
        let result = adapter.send(cancel, notification).await;

        if result.success {
            info!(
                notification_id = %notification.id,
                channel = %notification.channel,
                recipient = %notification.recipient,
                "分发成功"
            );
        } else {
            warn!(
                notification_id = %notification.id,
                channel = %notification.channel,
                recipient = %notification.recipient,
                error = %result.error,
                "分发失败"
            );
        }

        self.settle_attempt(notification, &result).await;
        result
    }

    /// 按发送结果推进状态机（唯一的分类点）
    ///
    /// 成功 → success 终态并摘除队列条目；失败 → 原子计数后，
    /// 达到上限转 failed_permanent，否则按指数退避重排。
    /// 存储写入失败只记日志，返回的结果始终只反映适配器的结果。
    async fn settle_attempt(&self, notification: &Notification, result: &DispatchResult) {
        let id = notification.id.as_str();

        // 服务商响应尽力落库，不参与分类
        if let (Some(status), Some(body)) = (result.api_status, result.api_body.as_deref()) {
            if let Err(e) = self.store.update_api_response(id, status, body).await {
                error!(notification_id = %id, error = %e, "服务商响应写入失败");
            }
        }

        if result.success {
            if let Err(e) = self
                .store
                .update_status(id, NotificationStatus::Success, "")
                .await
            {
                error!(notification_id = %id, error = %e, "成功状态写入失败");
            }
            // 首次发送成功时本就不在队列中，摘除为 no-op
            if let Err(e) = self.store.remove_from_retry_queue(id).await {
                error!(notification_id = %id, error = %e, "摘除队列条目失败");
            }
            return;
        }

        let attempts = match self.store.increment_attempts(id, &result.error).await {
            Ok(n) => n,
            Err(e) => {
                error!(
                    notification_id = %id,
                    error = %e,
                    "尝试计数失败，按保守间隔重排"
                );
                let due = Utc::now() + chrono::Duration::seconds(INCREMENT_FAILURE_REQUEUE_SECS);
                if let Err(e) = self.store.schedule_retry(id, due, &result.error).await {
                    error!(notification_id = %id, error = %e, "保守重排失败");
                }
                return;
            }
        };

        let cap = notification.retry_cap(self.config.default_max_retries);
        if attempts >= cap {
            if let Err(e) = self
                .store
                .update_status(id, NotificationStatus::FailedPermanent, &result.error)
                .await
            {
                error!(notification_id = %id, error = %e, "永久失败状态写入失败");
            }
            if let Err(e) = self.store.remove_from_retry_queue(id).await {
                error!(notification_id = %id, error = %e, "摘除队列条目失败");
            }
            info!(
                notification_id = %id,
                attempts,
                cap,
                "已达尝试上限，标记永久失败"
            );
            return;
        }

        let delay_secs = self.backoff_delay(attempts);
        let due = Utc::now() + chrono::Duration::seconds(delay_secs as i64);

        if let Err(e) = self
            .store
            .update_status(id, NotificationStatus::Failed, &result.error)
            .await
        {
            error!(notification_id = %id, error = %e, "失败状态写入失败");
        }
        match self.store.schedule_retry(id, due, &result.error).await {
            Ok(()) => info!(
                notification_id = %id,
                attempts,
                cap,
                delay_secs,
                "已安排重试"
            ),
            Err(e) => error!(notification_id = %id, error = %e, "安排重试失败"),
        }
    }

    /// 第 k 次失败后的退避秒数：min(base * 2^(k-1), max)
    fn backoff_delay(&self, attempts: u32) -> u64 {
        let shift = attempts.saturating_sub(1).min(63);
        let factor = 1u64 << shift;
        self.config
            .base_backoff_secs
            .checked_mul(factor)
            .unwrap_or(self.config.max_backoff_secs)
            .min(self.config.max_backoff_secs)
    }
}

/// 构造 parent 的子 token 并附加 deadline
///
/// 超时或 parent 取消任一发生时，返回的 token 进入取消态。
/// 用于在线分发：扇出不继承请求生命周期，但受进程关闭与超时约束。
pub fn deadline_token(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let token = parent.child_token();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => timer.cancel(),
            _ = timer.cancelled() => {}
        }
    });
    token
}
