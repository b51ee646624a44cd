//! HTTP 接口集成测试
//!
//! 通过 Router + oneshot 驱动完整的请求处理链路，
//! 验证校验错误的响应体措辞与成功扇出的响应格式。

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use notification_service::dispatcher::channels::ChannelAdapter;
use notification_service::dispatcher::Dispatcher;
use notification_service::models::{DispatchResult, Notification, NotificationStatus};
use notification_service::routes;
use notification_service::state::AppState;
use notification_service::store::{MemoryStore, NotificationStore};
use notify_shared::config::DispatchConfig;
use notify_shared::error::{NotifyError, Result as NotifyResult};

// ==================== 测试辅助 ====================

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

fn create_test_app(store: Arc<MemoryStore>) -> Router {
    let mut dispatcher = Dispatcher::new(store.clone(), DispatchConfig::default());
    dispatcher.register_channel("email", Arc::new(AlwaysOk));
    dispatcher.register_channel("sms", Arc::new(AlwaysOk));

    let state = AppState::new(
        Arc::new(dispatcher),
        store,
        DispatchConfig::default(),
        CancellationToken::new(),
    );
    routes::api_routes().with_state(state)
}

async fn post_event(app: Router, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ==================== 事件提交 ====================

#[tokio::test]
async fn test_post_event_success() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());

    let body = r#"{
        "id": "e1",
        "type": "t",
        "title": "T",
        "message": "M",
        "channels": ["email"],
        "recipients": ["a@x", "b@x"]
    }"#;
    let (status, json) = post_event(app, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert!(json["message"].as_str().unwrap().contains("dispatched"));

    // 首轮扇出在响应返回前已完成
    assert_eq!(store.notification_count(), 2);
    for notif in store.list_notifications() {
        assert_eq!(notif.status, NotificationStatus::Success);
    }
}

#[tokio::test]
async fn test_post_event_invalid_json() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());

    let (status, json) = post_event(app, "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid JSON payload");
    assert_eq!(store.notification_count(), 0);
}

#[tokio::test]
async fn test_post_event_missing_id_or_type() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());

    let body = r#"{"message":"M","channels":["sms"],"recipients":["+1"]}"#;
    let (status, json) = post_event(app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "missing required fields: id or type");
    assert_eq!(store.notification_count(), 0);
}

#[tokio::test]
async fn test_post_event_no_recipients() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());

    let body = r#"{"id":"e3","type":"t","channels":["sms"]}"#;
    let (status, json) = post_event(app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "no recipients specified");
    // 校验失败不产生任何存储写入
    assert_eq!(store.notification_count(), 0);
    assert_eq!(store.retry_queue_len(), 0);
}

#[tokio::test]
async fn test_post_event_no_channels() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());

    let body = r#"{"id":"e4","type":"t","recipients":["a@x"]}"#;
    let (status, json) = post_event(app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "no channels specified");
    assert_eq!(store.notification_count(), 0);
}

#[tokio::test]
async fn test_post_event_unknown_channel_is_not_client_error() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());

    // 渠道灰度：未知渠道跳过，已注册渠道正常扇出，整体仍返回 200
    let body = r#"{
        "id": "e5",
        "type": "t",
        "message": "M",
        "channels": ["email", "pigeon"],
        "recipients": ["a@x"]
    }"#;
    let (status, json) = post_event(app, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(store.notification_count(), 1);
}

// ==================== 存活探针 ====================

#[tokio::test]
async fn test_health_check_healthy() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_health_check_unhealthy() {
    /// Ping 必定失败的存储包装
    struct DownStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl NotificationStore for DownStore {
        async fn save_notification(&self, n: &Notification) -> NotifyResult<()> {
            self.inner.save_notification(n).await
        }
        async fn get_notification(&self, id: &str) -> NotifyResult<Notification> {
            self.inner.get_notification(id).await
        }
        async fn update_status(
            &self,
            id: &str,
            status: NotificationStatus,
            error: &str,
        ) -> NotifyResult<()> {
            self.inner.update_status(id, status, error).await
        }
        async fn increment_attempts(&self, id: &str, last_error: &str) -> NotifyResult<u32> {
            self.inner.increment_attempts(id, last_error).await
        }
        async fn schedule_retry(
            &self,
            id: &str,
            due_at: chrono::DateTime<chrono::Utc>,
            last_error: &str,
        ) -> NotifyResult<()> {
            self.inner.schedule_retry(id, due_at, last_error).await
        }
        async fn get_due_retries(
            &self,
            before: chrono::DateTime<chrono::Utc>,
            limit: usize,
        ) -> NotifyResult<Vec<String>> {
            self.inner.get_due_retries(before, limit).await
        }
        async fn remove_from_retry_queue(&self, id: &str) -> NotifyResult<()> {
            self.inner.remove_from_retry_queue(id).await
        }
        async fn update_api_response(&self, id: &str, code: u16, body: &str) -> NotifyResult<()> {
            self.inner.update_api_response(id, code, body).await
        }
        async fn ping(&self) -> NotifyResult<()> {
            Err(NotifyError::Internal("connection refused".to_string()))
        }
        async fn close(&self) -> NotifyResult<()> {
            Ok(())
        }
    }

    let store: Arc<dyn NotificationStore> = Arc::new(DownStore {
        inner: MemoryStore::new(),
    });
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), DispatchConfig::default()));
    let state = AppState::new(
        dispatcher,
        store,
        DispatchConfig::default(),
        CancellationToken::new(),
    );
    let app = routes::api_routes().with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "unhealthy");
    assert!(json["error"].as_str().unwrap().contains("connection refused"));
}
