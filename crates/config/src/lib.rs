//! mq-config - 配置加载库
//!
//! 加载顺序（后者覆盖前者）：
//! 1. `{dir}/default.toml`
//! 2. `{dir}/{APP_ENV}.toml`
//! 3. `MQ_` 前缀的环境变量，嵌套字段用 `__` 分隔（如 `MQ_KAFKA__BROKERS`）

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// Kafka 配置
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaSettings {
    /// 逗号分隔的 broker 地址列表（host:port）
    #[serde(default)]
    pub brokers: String,
    #[serde(default)]
    pub username: String,
    #[serde(default = "empty_secret")]
    pub password: Secret<String>,
    /// SASL 认证机制名称
    #[serde(default)]
    pub mechanisms: String,
    /// 安全协议名称
    #[serde(default)]
    pub protocol: String,
    /// PEM 格式 CA 证书路径，设置后启用 TLS
    #[serde(default)]
    pub ca_file: Option<String>,
    /// 输出逐条消息的调试日志
    #[serde(default)]
    pub is_debug: bool,
}

fn empty_secret() -> Secret<String> {
    Secret::new(String::new())
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    pub kafka: KafkaSettings,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());
        Self::from_figment(Self::figment(config_dir, &env))
    }

    /// 构建配置源
    pub fn figment(config_dir: &str, env: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("MQ_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}

#[cfg(test)]
mod tests;
