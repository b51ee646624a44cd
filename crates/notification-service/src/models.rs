//! 通知数据模型
//!
//! 定义事件、通知记录和分发结果的数据结构。
//! 事件是瞬态输入，不做持久化；通知记录按 (事件, 收件人, 渠道) 三元组
//! 逐条落库，由存储层负责生命周期。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use notify_shared::error::NotifyError;

/// 外部提交的通知事件
///
/// 所有字段带 serde 默认值：字段缺失表现为空值，由 `validate` 统一裁决，
/// 而不是在反序列化阶段报 JSON 错误。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    /// 本事件产生的通知的最大尝试次数，0 表示使用系统默认值
    #[serde(default)]
    pub max_retries: u32,
}

impl Event {
    /// 校验必填字段
    ///
    /// 错误信息直接面向客户端返回，措辞保持稳定。
    pub fn validate(&self) -> Result<(), NotifyError> {
        if self.id.is_empty() || self.event_type.is_empty() {
            return Err(NotifyError::Validation(
                "missing required fields: id or type".to_string(),
            ));
        }
        if self.recipients.is_empty() {
            return Err(NotifyError::Validation(
                "no recipients specified".to_string(),
            ));
        }
        if self.channels.is_empty() {
            return Err(NotifyError::Validation("no channels specified".to_string()));
        }
        Ok(())
    }
}

/// 通知记录生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Success,
    Failed,
    FailedPermanent,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::FailedPermanent => "failed_permanent",
        }
    }

    /// 终态不再参与任何状态迁移
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::FailedPermanent)
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "failed_permanent" => Ok(Self::FailedPermanent),
            other => Err(NotifyError::Internal(format!(
                "未知的通知状态: {other}"
            ))),
        }
    }
}

/// 单条通知记录
///
/// 每个 (事件, 收件人, 渠道) 对创建一条，`id` 为主键。
/// `recipient`、`channel`、`message` 创建后不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub event_id: String,
    pub recipient: String,
    pub channel: String,
    pub message: String,
    pub status: NotificationStatus,
    /// 最近一次状态迁移携带的错误信息（成功时为空）
    #[serde(default)]
    pub error: String,
    /// 已完成的发送尝试次数
    #[serde(default)]
    pub attempts: u32,
    /// 本条记录的尝试次数上限，0 表示使用系统默认值
    #[serde(default)]
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 最近一次尝试的错误，随 attempts 原子写入
    #[serde(default)]
    pub last_error: String,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// 服务商侧 HTTP 状态码（如有）
    pub api_status_code: Option<u16>,
    /// 服务商侧响应体摘要（如有）
    pub api_response: Option<String>,
}

impl Notification {
    /// 为事件的一个 (收件人, 渠道) 分支创建待发送记录
    ///
    /// id 使用 UUID v7，随时间单调递增，便于按创建顺序排查。
    pub fn new(event: &Event, recipient: impl Into<String>, channel: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("notif-{}", Uuid::now_v7()),
            event_id: event.id.clone(),
            recipient: recipient.into(),
            channel: channel.into(),
            message: event.message.clone(),
            status: NotificationStatus::Pending,
            error: String::new(),
            attempts: 0,
            max_retries: event.max_retries,
            created_at: now,
            updated_at: now,
            last_error: String::new(),
            last_attempt_at: None,
            api_status_code: None,
            api_response: None,
        }
    }

    /// 解析生效的尝试次数上限
    ///
    /// 记录自带 max_retries=0 时退回系统默认值。
    pub fn retry_cap(&self, default_max_retries: u32) -> u32 {
        if self.max_retries == 0 {
            default_max_retries
        } else {
            self.max_retries
        }
    }
}

/// 单次发送尝试的结果
///
/// 由渠道适配器返回，分发器据此驱动状态机。适配器本身不读写存储。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub notification_id: String,
    pub success: bool,
    #[serde(default)]
    pub error: String,
    pub timestamp: DateTime<Utc>,
    /// 服务商侧 HTTP 状态码（仅真实 API 渠道填写）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_status: Option<u16>,
    /// 服务商侧响应体（仅真实 API 渠道填写）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_body: Option<String>,
}

impl DispatchResult {
    /// 发送成功
    pub fn success(notification_id: impl Into<String>) -> Self {
        Self {
            notification_id: notification_id.into(),
            success: true,
            error: String::new(),
            timestamp: Utc::now(),
            api_status: None,
            api_body: None,
        }
    }

    /// 发送失败
    pub fn failure(notification_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            notification_id: notification_id.into(),
            success: false,
            error: error.into(),
            timestamp: Utc::now(),
            api_status: None,
            api_body: None,
        }
    }

    /// 因取消信号中止
    pub fn cancelled(notification_id: impl Into<String>) -> Self {
        Self::failure(notification_id, "context cancelled")
    }

    /// 附加服务商响应信息
    pub fn with_api_response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.api_status = Some(status);
        self.api_body = Some(body.into());
        self
    }
}
