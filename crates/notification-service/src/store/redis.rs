//! Redis 存储实现
//!
//! 通知记录存为 `notification:<id>` hash，重试队列存为 `retry_queue`
//! sorted set（member = 通知 id，score = 到期时间的 Unix 秒）。
//! 数值字段以十进制字符串落库，时间戳以 Unix 秒落库。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::info;

use notify_shared::config::RedisConfig;
use notify_shared::error::{NotifyError, Result};

use super::{MAX_API_RESPONSE_BYTES, NotificationStore, truncate_utf8};
use crate::models::{Notification, NotificationStatus};

const RETRY_QUEUE_KEY: &str = "retry_queue";

/// Redis 通知存储
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    /// 创建客户端并以 PING 校验连通性
    ///
    /// 连接失败直接返回错误，由调用方决定是否终止进程。
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        let store = Self { client };
        store.ping().await?;
        info!("Redis store connected");
        Ok(store)
    }

    async fn conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(NotifyError::from)
    }

    fn notification_key(id: &str) -> String {
        format!("notification:{id}")
    }

    /// 从 HGETALL 结果还原记录
    fn parse_notification(id: &str, fields: HashMap<String, String>) -> Result<Notification> {
        let text = |name: &str| fields.get(name).cloned().unwrap_or_default();
        // 数值字段写入时可省略，读取时一律还原为 0
        let number = |name: &str| -> i64 {
            fields
                .get(name)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
        };
        let timestamp = |name: &str| {
            DateTime::from_timestamp(number(name), 0).unwrap_or_else(|| DateTime::UNIX_EPOCH)
        };

        let status: NotificationStatus = text("status").parse()?;

        Ok(Notification {
            id: id.to_string(),
            event_id: text("event_id"),
            recipient: text("recipient"),
            channel: text("channel"),
            message: text("message"),
            status,
            error: text("error"),
            attempts: number("attempts") as u32,
            max_retries: number("max_retries") as u32,
            created_at: timestamp("created_at"),
            updated_at: timestamp("updated_at"),
            last_error: text("last_error"),
            last_attempt_at: fields
                .get("last_attempt_at")
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|t| DateTime::from_timestamp(t, 0)),
            api_status_code: fields.get("api_code").and_then(|v| v.parse::<u16>().ok()),
            api_response: fields.get("api_response").cloned(),
        })
    }
}

#[async_trait]
impl NotificationStore for RedisStore {
    async fn save_notification(&self, notification: &Notification) -> Result<()> {
        let key = Self::notification_key(&notification.id);

        let mut fields: Vec<(&str, String)> = vec![
            ("event_id", notification.event_id.clone()),
            ("recipient", notification.recipient.clone()),
            ("channel", notification.channel.clone()),
            ("message", notification.message.clone()),
            ("status", notification.status.as_str().to_string()),
            ("error", notification.error.clone()),
            ("attempts", notification.attempts.to_string()),
            ("max_retries", notification.max_retries.to_string()),
            ("last_error", notification.last_error.clone()),
            ("created_at", notification.created_at.timestamp().to_string()),
            ("updated_at", notification.updated_at.timestamp().to_string()),
        ];
        if let Some(at) = notification.last_attempt_at {
            fields.push(("last_attempt_at", at.timestamp().to_string()));
        }
        if let Some(code) = notification.api_status_code {
            fields.push(("api_code", code.to_string()));
        }
        if let Some(ref body) = notification.api_response {
            fields.push(("api_response", body.clone()));
        }

        let mut conn = self.conn().await?;
        let _: () = conn.hset_multiple(key, &fields).await?;
        Ok(())
    }

    async fn get_notification(&self, id: &str) -> Result<Notification> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = conn.hgetall(Self::notification_key(id)).await?;

        if fields.is_empty() {
            return Err(NotifyError::notification_not_found(id));
        }

        Self::parse_notification(id, fields)
    }

    async fn update_status(
        &self,
        id: &str,
        status: NotificationStatus,
        error: &str,
    ) -> Result<()> {
        let fields = [
            ("status", status.as_str().to_string()),
            ("error", error.to_string()),
            ("updated_at", Utc::now().timestamp().to_string()),
        ];

        let mut conn = self.conn().await?;
        let _: () = conn
            .hset_multiple(Self::notification_key(id), &fields)
            .await?;
        Ok(())
    }

    async fn increment_attempts(&self, id: &str, last_error: &str) -> Result<u32> {
        let key = Self::notification_key(id);
        let mut conn = self.conn().await?;

        // MULTI/EXEC：自增与错误字段写入对并发调用方表现为单个操作，
        // HINCRBY 保证并发自增各自拿到不同的返回值
        let (attempts,): (i64,) = redis::pipe()
            .atomic()
            .hincr(&key, "attempts", 1)
            .hset(&key, "last_error", last_error)
            .ignore()
            .hset(&key, "last_attempt_at", Utc::now().timestamp())
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(attempts as u32)
    }

    async fn schedule_retry(
        &self,
        id: &str,
        due_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<()> {
        let key = Self::notification_key(id);
        let mut conn = self.conn().await?;

        // ZADD 对已存在的 member 更新 score，后写覆盖先写
        let _: () = redis::pipe()
            .atomic()
            .hset(&key, "error", last_error)
            .ignore()
            .hset(&key, "updated_at", Utc::now().timestamp())
            .ignore()
            .zadd(RETRY_QUEUE_KEY, id, due_at.timestamp())
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn get_due_retries(&self, before: DateTime<Utc>, limit: usize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .zrangebyscore_limit(
                RETRY_QUEUE_KEY,
                "-inf",
                before.timestamp(),
                0,
                limit as isize,
            )
            .await?;
        Ok(ids)
    }

    async fn remove_from_retry_queue(&self, id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.zrem(RETRY_QUEUE_KEY, id).await?;
        Ok(())
    }

    async fn update_api_response(&self, id: &str, status_code: u16, body: &str) -> Result<()> {
        let fields = [
            ("api_code", status_code.to_string()),
            (
                "api_response",
                truncate_utf8(body, MAX_API_RESPONSE_BYTES).to_string(),
            ),
            ("updated_at", Utc::now().timestamp().to_string()),
        ];

        let mut conn = self.conn().await?;
        let _: () = conn
            .hset_multiple(Self::notification_key(id), &fields)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(NotifyError::from)
    }

    async fn close(&self) -> Result<()> {
        // 多路复用连接随 Drop 释放，无需显式断开
        Ok(())
    }
}
