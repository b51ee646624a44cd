//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::observability::ObservabilityConfig;

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// 分发与重试配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 单条通知的默认最大尝试次数（记录自带 max_retries=0 时生效）
    pub default_max_retries: u32,
    /// 指数退避基础间隔（秒）
    pub base_backoff_secs: u64,
    /// 退避间隔上限（秒）
    pub max_backoff_secs: u64,
    /// 在线分发的整体超时（秒）
    pub dispatch_timeout_secs: u64,
    /// 重试队列轮询间隔（秒）
    pub poll_interval_secs: u64,
    /// 单次轮询取出的到期通知上限
    pub due_batch_limit: usize,
}

impl Default for DispatchConfig {
    /// 默认策略：最多尝试 5 次，退避从 5 分钟翻倍增长至 24 小时封顶，
    /// 在线分发 10 秒超时，重试队列每分钟轮询一次
    fn default() -> Self {
        Self {
            default_max_retries: 5,
            base_backoff_secs: 300,
            max_backoff_secs: 86_400,
            dispatch_timeout_secs: 10,
            poll_interval_secs: 60,
            due_batch_limit: 100,
        }
    }
}

impl DispatchConfig {
    /// 在线分发超时
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    /// 轮询间隔
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// SMS 服务商配置
///
/// 凭证缺省时 SMS 渠道仍会注册，但发送会以"凭证未配置"失败并进入重试，
/// 便于渠道灰度上线。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    /// 自定义 API 端点（为空时使用服务商默认端点）
    pub endpoint: Option<String>,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
}

impl SmsConfig {
    /// 凭证是否已配置完整
    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty() && !self.from_number.is_empty()
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub dispatch: DispatchConfig,
    pub sms: SmsConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（NOTIFY_ 前缀，如 NOTIFY_REDIS_URL -> redis.url）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("NOTIFY_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("NOTIFY")
                    .separator("_")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
