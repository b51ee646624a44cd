//! 分发流程集成测试
//!
//! 使用内存存储和脚本化渠道适配器，验证扇出完整性、失败入队、
//! 取消传导等跨组件行为。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use notification_service::dispatcher::channels::ChannelAdapter;
use notification_service::dispatcher::Dispatcher;
use notification_service::models::{DispatchResult, Event, Notification, NotificationStatus};
use notification_service::store::{MemoryStore, NotificationStore};
use notify_shared::config::DispatchConfig;

// ==================== 测试辅助 ====================

/// 固定成功的渠道
struct AlwaysOk;

#[async_trait]
impl ChannelAdapter for AlwaysOk {
    fn name(&self) -> &str {
        "ok"
    }
    async fn send(
        &self,
        _cancel: &CancellationToken,
        notification: &Notification,
    ) -> DispatchResult {
        DispatchResult::success(&notification.id)
    }
}

/// 固定失败的渠道
struct AlwaysFail(&'static str);

#[async_trait]
impl ChannelAdapter for AlwaysFail {
    fn name(&self) -> &str {
        "fail"
    }
    async fn send(
        &self,
        _cancel: &CancellationToken,
        notification: &Notification,
    ) -> DispatchResult {
        DispatchResult::failure(&notification.id, self.0)
    }
}

/// 慢渠道：只有取消信号能让它提前返回
struct Slow;

#[async_trait]
impl ChannelAdapter for Slow {
    fn name(&self) -> &str {
        "slow"
    }
    async fn send(
        &self,
        cancel: &CancellationToken,
        notification: &Notification,
    ) -> DispatchResult {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(30)) => {
                DispatchResult::success(&notification.id)
            }
            _ = cancel.cancelled() => DispatchResult::cancelled(&notification.id),
        }
    }
}

fn event(channels: &[&str], recipients: &[&str]) -> Event {
    Event {
        id: "evt-1".to_string(),
        event_type: "alert".to_string(),
        title: "告警".to_string(),
        message: "磁盘使用率超过 90%".to_string(),
        channels: channels.iter().map(|s| s.to_string()).collect(),
        recipients: recipients.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

// ==================== 场景测试 ====================

#[tokio::test]
async fn test_happy_path_two_recipients() {
    let store = Arc::new(MemoryStore::new());
    let mut dispatcher = Dispatcher::new(store.clone(), DispatchConfig::default());
    dispatcher.register_channel("email", Arc::new(AlwaysOk));

    let results = dispatcher
        .dispatch_event(&CancellationToken::new(), &event(&["email"], &["a@x", "b@x"]))
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));

    let notifications = store.list_notifications();
    assert_eq!(notifications.len(), 2);
    for notif in &notifications {
        assert_eq!(notif.status, NotificationStatus::Success);
        assert_eq!(notif.event_id, "evt-1");
        assert!(notif.error.is_empty());
    }
    assert_eq!(store.retry_queue_len(), 0);
}

#[tokio::test]
async fn test_mixed_channels_partial_failure() {
    let store = Arc::new(MemoryStore::new());
    let mut dispatcher = Dispatcher::new(store.clone(), DispatchConfig::default());
    dispatcher.register_channel("email", Arc::new(AlwaysOk));
    dispatcher.register_channel("sms", Arc::new(AlwaysFail("provider 5xx")));

    let results = dispatcher
        .dispatch_event(
            &CancellationToken::new(),
            &event(&["email", "sms"], &["a@x", "b@x"]),
        )
        .await;

    // 2 渠道 × 2 收件人，分支互不影响
    assert_eq!(results.len(), 4);
    assert_eq!(results.iter().filter(|r| r.success).count(), 2);

    for notif in store.list_notifications() {
        match notif.channel.as_str() {
            "email" => {
                assert_eq!(notif.status, NotificationStatus::Success);
                assert!(!store.retry_queue_contains(&notif.id));
            }
            "sms" => {
                assert_eq!(notif.status, NotificationStatus::Failed);
                assert_eq!(notif.attempts, 1);
                assert_eq!(notif.error, "provider 5xx");
                assert!(store.retry_queue_contains(&notif.id));
            }
            other => panic!("unexpected channel {other}"),
        }
    }
}

#[tokio::test]
async fn test_same_event_twice_no_dedup() {
    let store = Arc::new(MemoryStore::new());
    let mut dispatcher = Dispatcher::new(store.clone(), DispatchConfig::default());
    dispatcher.register_channel("email", Arc::new(AlwaysOk));

    let evt = event(&["email"], &["a@x"]);
    dispatcher
        .dispatch_event(&CancellationToken::new(), &evt)
        .await;
    dispatcher
        .dispatch_event(&CancellationToken::new(), &evt)
        .await;

    // 同一事件提交两次产生两组独立的通知记录
    assert_eq!(store.notification_count(), 2);
}

#[tokio::test]
async fn test_cancellation_unblocks_dispatch() {
    let store = Arc::new(MemoryStore::new());
    let mut dispatcher = Dispatcher::new(store.clone(), DispatchConfig::default());
    dispatcher.register_channel("push", Arc::new(Slow));
    let dispatcher = Arc::new(dispatcher);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let evt = event(&["push"], &["device-1", "device-2"]);
    let results = tokio::time::timeout(
        Duration::from_secs(2),
        dispatcher.dispatch_event(&cancel, &evt),
    )
    .await
    .expect("dispatch_event must return promptly after cancellation");

    assert_eq!(results.len(), 2);
    for result in &results {
        assert!(!result.success);
        assert_eq!(result.error, "context cancelled");
    }

    // 被取消的尝试同样经过分类：计数加一并进入重试队列
    for notif in store.list_notifications() {
        assert_eq!(notif.status, NotificationStatus::Failed);
        assert_eq!(notif.attempts, 1);
        assert!(store.retry_queue_contains(&notif.id));
    }
}

#[tokio::test]
async fn test_attempts_monotonic_across_paths() {
    let store = Arc::new(MemoryStore::new());
    let mut dispatcher = Dispatcher::new(store.clone(), DispatchConfig::default());
    dispatcher.register_channel("sms", Arc::new(AlwaysFail("provider down")));

    let results = dispatcher
        .dispatch_event(&CancellationToken::new(), &event(&["sms"], &["+15550001111"]))
        .await;
    let id = results[0].notification_id.clone();

    let mut last_attempts = 0;
    for _ in 0..3 {
        let notif = store.get_notification(&id).await.unwrap();
        assert!(notif.attempts >= last_attempts);
        last_attempts = notif.attempts;
        dispatcher
            .dispatch_notification(&CancellationToken::new(), &notif)
            .await;
    }

    let notif = store.get_notification(&id).await.unwrap();
    assert_eq!(notif.attempts, 4);
}
