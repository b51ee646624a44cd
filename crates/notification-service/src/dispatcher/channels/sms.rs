//! SMS 短信通知渠道
//!
//! 通过短信服务商的 REST API 发送（Twilio 风格：basic auth + 表单提交）。
//! 服务商侧的 HTTP 状态码与响应体随结果返回，由分发器决定是否落库。

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use notify_shared::config::SmsConfig;

use super::ChannelAdapter;
use crate::models::{DispatchResult, Notification};

/// 凭证未配置时请求超时的兜底值（秒）
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// SMS 短信通知渠道
///
/// 重试路径上没有整体 deadline，因此请求超时必须由客户端自身兜底，
/// 避免服务商挂起拖死 worker 任务。
pub struct SmsAdapter {
    config: SmsConfig,
    client: reqwest::Client,
    endpoint: String,
}

impl SmsAdapter {
    pub fn new(config: SmsConfig) -> Self {
        let timeout_secs = if config.request_timeout_secs == 0 {
            DEFAULT_REQUEST_TIMEOUT_SECS
        } else {
            config.request_timeout_secs
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        let endpoint = config.endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
                config.account_sid
            )
        });

        Self {
            config,
            client,
            endpoint,
        }
    }

    /// 收件人须为 E.164 风格号码（+ 开头，其余为数字）
    fn is_valid_msisdn(recipient: &str) -> bool {
        let Some(digits) = recipient.strip_prefix('+') else {
            return false;
        };
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    }
}

#[async_trait]
impl ChannelAdapter for SmsAdapter {
    fn name(&self) -> &str {
        "sms"
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        notification: &Notification,
    ) -> DispatchResult {
        if !Self::is_valid_msisdn(&notification.recipient) {
            return DispatchResult::failure(
                &notification.id,
                format!("invalid sms recipient: {}", notification.recipient),
            );
        }

        if !self.config.is_configured() {
            return DispatchResult::failure(
                &notification.id,
                "sms provider credentials not configured",
            );
        }

        let form = [
            ("To", notification.recipient.as_str()),
            ("From", self.config.from_number.as_str()),
            ("Body", notification.message.as_str()),
        ];
        let request = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send();

        let response = tokio::select! {
            response = request => response,
            _ = cancel.cancelled() => {
                return DispatchResult::cancelled(&notification.id);
            }
        };

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();

                if (200..300).contains(&status) {
                    info!(
                        notification_id = %notification.id,
                        recipient = %notification.recipient,
                        status,
                        "短信发送成功"
                    );
                    DispatchResult::success(&notification.id).with_api_response(status, body)
                } else {
                    warn!(
                        notification_id = %notification.id,
                        recipient = %notification.recipient,
                        status,
                        "短信服务商返回错误"
                    );
                    DispatchResult::failure(
                        &notification.id,
                        format!("sms provider returned {status}"),
                    )
                    .with_api_response(status, body)
                }
            }
            Err(e) => {
                warn!(
                    notification_id = %notification.id,
                    recipient = %notification.recipient,
                    error = %e,
                    "短信请求失败"
                );
                DispatchResult::failure(&notification.id, e.to_string())
            }
        }
    }
}
