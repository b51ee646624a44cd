//! 可观测性模块
//!
//! 提供日志订阅器的统一初始化。所有服务通过单一入口点配置日志，
//! 确保一致的输出格式和过滤规则。

use anyhow::Result;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// 可观测性配置
///
/// 支持从 toml 配置文件反序列化，服务启动时通过 `AppConfig::load()` 加载后，
/// 使用 `with_service_name()` 注入服务名。
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志来源
    /// 通常由 AppConfig 在加载后自动设置，toml 中无需配置
    #[serde(default)]
    pub service_name: String,

    /// 日志级别（如 "info", "debug"）
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl ObservabilityConfig {
    /// 设置服务名称，返回新的配置实例
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }

    /// 是否使用 JSON 格式日志
    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

/// 可观测性资源守卫
///
/// 持有日志订阅器的生命周期，服务退出时随 main 一起释放。
pub struct ObservabilityGuard {
    _private: (),
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!("Shutting down observability...");
    }
}

/// 初始化日志订阅器
///
/// 环境变量 RUST_LOG 优先于配置文件中的 log_level。
/// 重复初始化（如测试中）会返回错误，调用方可按需忽略。
pub fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if config.json_logs() {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    info!(service = %config.service_name, "Observability initialized");

    Ok(ObservabilityGuard { _private: () })
}
