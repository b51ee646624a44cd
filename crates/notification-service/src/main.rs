//! 通知分发服务入口
//!
//! 初始化顺序：配置 → 日志 → 存储（失败即退出）→ 分发器 → 重试 worker
//! → HTTP 服务。优雅关闭时取消根 token，传导到重试 worker 与所有在途发送。

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use notification_service::dispatcher::Dispatcher;
use notification_service::routes;
use notification_service::state::AppState;
use notification_service::store::{NotificationStore, RedisStore};
use notification_service::worker::RetryWorker;
use notify_shared::config::AppConfig;
use notify_shared::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("notification-service").unwrap_or_default();

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config)?;

    info!("Starting notification-service on {}", config.server_addr());

    // 存储不可用视为致命错误，进程直接退出
    let store: Arc<dyn NotificationStore> = Arc::new(RedisStore::connect(&config.redis).await?);

    let dispatcher = Arc::new(Dispatcher::with_default_channels(store.clone(), &config));

    // 根取消信号：优雅关闭时传导到 worker 与所有在途发送
    let shutdown = CancellationToken::new();

    let worker = RetryWorker::new(store.clone(), dispatcher.clone(), &config.dispatch);
    let worker_cancel = shutdown.child_token();
    tokio::spawn(async move {
        worker.run(worker_cancel).await;
    });

    let state = AppState::new(
        dispatcher,
        store.clone(),
        config.dispatch.clone(),
        shutdown.clone(),
    );
    let app = routes::api_routes().with_state(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    let shutdown_trigger = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_trigger.cancel();
        })
        .await?;

    store.close().await?;
    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
/// 收到任一信号后返回，触发 axum 的优雅关闭流程。
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
