//! 通知重试 Worker
//!
//! 以固定间隔轮询重试队列，对到期的通知重新发起分发。
//! 分类逻辑与在线路径共用分发器的同一实现，保证两条路径产生一致的状态。
//!
//! 队列条目在分发前不摘除：失败时被新的到期时间覆盖，
//! 成功或永久失败时摘除。轮询拿到但处理中途崩溃的条目会在下个周期重现。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use notify_shared::config::DispatchConfig;

use crate::dispatcher::Dispatcher;
use crate::store::NotificationStore;

/// 通知重试 Worker
///
/// 每个进程启动一个，生命周期由根取消信号控制。
pub struct RetryWorker {
    store: Arc<dyn NotificationStore>,
    dispatcher: Arc<Dispatcher>,
    /// 轮询间隔
    poll_interval: Duration,
    /// 单次轮询取出的到期通知上限
    batch_limit: usize,
}

impl RetryWorker {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        dispatcher: Arc<Dispatcher>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            poll_interval: config.poll_interval(),
            batch_limit: config.due_batch_limit,
        }
    }

    /// 主循环：持续轮询直到取消信号触发
    ///
    /// 收到取消后在当前轮询间隔内退出，不等待已派生的发送任务——
    /// 它们通过同一取消信号自行尽快返回。
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_limit = self.batch_limit,
            "重试 worker 已启动"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("重试 worker 退出");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            self.tick(&cancel).await;
        }
    }

    /// 处理一个轮询周期：取出到期通知，逐条派生重发任务
    pub async fn tick(&self, cancel: &CancellationToken) {
        let now = Utc::now();

        let ids = match self.store.get_due_retries(now, self.batch_limit).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "读取到期重试失败");
                return;
            }
        };

        if ids.is_empty() {
            return;
        }
        debug!(count = ids.len(), "发现到期的重试通知");

        for id in ids {
            let store = self.store.clone();
            let dispatcher = self.dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                Self::process_due(store, dispatcher, cancel, id).await;
            });
        }
    }

    /// 重发一条到期通知
    async fn process_due(
        store: Arc<dyn NotificationStore>,
        dispatcher: Arc<Dispatcher>,
        cancel: CancellationToken,
        id: String,
    ) {
        // 每次重试都从存储重新加载快照，不依赖任何跨尝试的内存状态
        let notification = match store.get_notification(&id).await {
            Ok(n) => n,
            Err(e) if e.is_not_found() => {
                warn!(notification_id = %id, "队列条目指向不存在的记录，摘除");
                if let Err(e) = store.remove_from_retry_queue(&id).await {
                    error!(notification_id = %id, error = %e, "摘除失效条目失败");
                }
                return;
            }
            Err(e) => {
                error!(notification_id = %id, error = %e, "加载通知失败");
                return;
            }
        };

        let result = dispatcher.dispatch_notification(&cancel, &notification).await;

        if result.success {
            info!(notification_id = %id, "重试成功");
        } else {
            debug!(
                notification_id = %id,
                error = %result.error,
                attempts = notification.attempts + 1,
                "重试仍然失败"
            );
        }
    }
}
