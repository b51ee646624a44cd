//! 通知持久化存储
//!
//! 存储层由契约定义而非后端实现：通知记录的幂等写入、按 id 读取、
//! 状态迁移、原子的尝试计数，以及按到期时间排序的重试队列。
//!
//! ## 实现
//!
//! - [`RedisStore`]: 生产实现，hash + sorted set
//! - [`MemoryStore`]: 测试与本地开发实现

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use notify_shared::error::Result;

use crate::models::{Notification, NotificationStatus};

/// 服务商响应体的持久化长度上限（字节）
pub const MAX_API_RESPONSE_BYTES: usize = 1000;

/// 通知存储契约
///
/// 除 `increment_attempts` 与 `schedule_retry` 要求单操作原子性外，
/// 不提供跨操作事务。记录缺失统一以 `NotifyError::NotFound` 表达。
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// 按 id 幂等写入完整记录
    async fn save_notification(&self, notification: &Notification) -> Result<()>;

    /// 读取完整记录快照
    async fn get_notification(&self, id: &str) -> Result<Notification>;

    /// 只更新 status / error / updated_at，不触碰 attempts
    async fn update_status(
        &self,
        id: &str,
        status: NotificationStatus,
        error: &str,
    ) -> Result<()>;

    /// 原子地将 attempts 加一并写入 last_error / last_attempt_at
    ///
    /// 返回自增后的计数；并发调用方观察到的返回值互不相同。
    async fn increment_attempts(&self, id: &str, last_error: &str) -> Result<u32>;

    /// 更新记录的 error / updated_at，并把队列条目写到新的到期时间
    ///
    /// 同一 id 的后写覆盖先写（last write wins）。
    async fn schedule_retry(
        &self,
        id: &str,
        due_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<()>;

    /// 按到期时间升序返回 due_at <= before 的 id，至多 limit 条
    ///
    /// 只读操作，不摘除队列条目。
    async fn get_due_retries(&self, before: DateTime<Utc>, limit: usize) -> Result<Vec<String>>;

    /// 摘除队列条目，条目不存在时为 no-op
    async fn remove_from_retry_queue(&self, id: &str) -> Result<()>;

    /// 记录最近一次服务商侧响应，响应体截断至 1000 字节
    async fn update_api_response(&self, id: &str, status_code: u16, body: &str) -> Result<()>;

    /// 存活检查
    async fn ping(&self) -> Result<()>;

    /// 关闭存储连接
    async fn close(&self) -> Result<()>;
}

/// 在 UTF-8 字符边界上把字符串截断到 max_bytes 字节以内
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
