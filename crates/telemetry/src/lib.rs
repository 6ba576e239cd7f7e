//! telemetry - 可观测性库
//!
//! - tracing 初始化（文本 / JSON）
//! - Prometheus metrics recorder
//! - `TracingLogger`：把 `Logger` 协作者接口桥接到 tracing

use metrics::describe_counter;
use mq_errors::{MqError, MqResult};
use mq_ports::{DisplayFields, Field, Logger};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 初始化 tracing
pub fn init_tracing(log_level: &str) -> MqResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| MqError::internal(format!("Failed to init tracing: {}", e)))
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) -> MqResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| MqError::internal(format!("Failed to init tracing: {}", e)))
}

/// 初始化 Prometheus metrics，并登记适配器输出的计数器说明
pub fn init_metrics() -> MqResult<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MqError::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    describe_counter!("mq_messages_published_total", "Messages written to the broker");
    describe_counter!("mq_publish_failures_total", "Publish attempts rejected by the writer");
    describe_counter!("mq_messages_consumed_total", "Messages fetched by subscription loops");
    describe_counter!("mq_messages_committed_total", "Offsets committed after handling");
    describe_counter!("mq_commit_failures_total", "Offset commits that failed");
    describe_counter!("mq_fetch_errors_total", "Transient fetch errors");

    Ok(handle)
}

/// 基于 tracing 的 `Logger` 实现
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, msg: &str, fields: &[Field]) {
        tracing::info!(fields = %DisplayFields(fields), "{}", msg);
    }

    fn warn(&self, msg: &str, fields: &[Field]) {
        tracing::warn!(fields = %DisplayFields(fields), "{}", msg);
    }

    fn error(&self, msg: &str, fields: &[Field]) {
        tracing::error!(fields = %DisplayFields(fields), "{}", msg);
    }

    fn debug(&self, msg: &str, fields: &[Field]) {
        tracing::debug!(fields = %DisplayFields(fields), "{}", msg);
    }
}
