//! 内存存储实现
//!
//! 基于 DashMap 的内存实现，适用于测试和本地开发环境。
//! 分片锁保证单条记录上的读改写（如尝试计数自增）是原子的。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use notify_shared::error::{NotifyError, Result};

use super::{MAX_API_RESPONSE_BYTES, NotificationStore, truncate_utf8};
use crate::models::{Notification, NotificationStatus};

/// 内存通知存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Notification>,
    /// 重试队列：通知 id -> 到期时间（Unix 秒）
    retry_queue: DashMap<String, i64>,
}

impl MemoryStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录总数
    pub fn notification_count(&self) -> usize {
        self.records.len()
    }

    /// 队列长度
    pub fn retry_queue_len(&self) -> usize {
        self.retry_queue.len()
    }

    /// 查询队列条目的到期时间
    pub fn retry_queue_score(&self, id: &str) -> Option<i64> {
        self.retry_queue.get(id).map(|entry| *entry.value())
    }

    /// 队列中是否存在指定 id
    pub fn retry_queue_contains(&self, id: &str) -> bool {
        self.retry_queue.contains_key(id)
    }

    /// 列出全部记录
    pub fn list_notifications(&self) -> Vec<Notification> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn save_notification(&self, notification: &Notification) -> Result<()> {
        self.records
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn get_notification(&self, id: &str) -> Result<Notification> {
        self.records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| NotifyError::notification_not_found(id))
    }

    async fn update_status(
        &self,
        id: &str,
        status: NotificationStatus,
        error: &str,
    ) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| NotifyError::notification_not_found(id))?;
        entry.status = status;
        entry.error = error.to_string();
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_attempts(&self, id: &str, last_error: &str) -> Result<u32> {
        // get_mut 持有分片写锁，自增与字段写入对并发调用方原子可见
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| NotifyError::notification_not_found(id))?;
        entry.attempts += 1;
        entry.last_error = last_error.to_string();
        entry.last_attempt_at = Some(Utc::now());
        Ok(entry.attempts)
    }

    async fn schedule_retry(
        &self,
        id: &str,
        due_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<()> {
        if let Some(mut entry) = self.records.get_mut(id) {
            entry.error = last_error.to_string();
            entry.updated_at = Utc::now();
        }
        self.retry_queue.insert(id.to_string(), due_at.timestamp());
        Ok(())
    }

    async fn get_due_retries(&self, before: DateTime<Utc>, limit: usize) -> Result<Vec<String>> {
        let cutoff = before.timestamp();
        let mut due: Vec<(i64, String)> = self
            .retry_queue
            .iter()
            .filter(|entry| *entry.value() <= cutoff)
            .map(|entry| (*entry.value(), entry.key().clone()))
            .collect();
        due.sort();
        due.truncate(limit);
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    async fn remove_from_retry_queue(&self, id: &str) -> Result<()> {
        self.retry_queue.remove(id);
        Ok(())
    }

    async fn update_api_response(&self, id: &str, status_code: u16, body: &str) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| NotifyError::notification_not_found(id))?;
        entry.api_status_code = Some(status_code);
        entry.api_response = Some(truncate_utf8(body, MAX_API_RESPONSE_BYTES).to_string());
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
