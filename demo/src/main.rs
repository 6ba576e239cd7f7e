//! mq-demo - 消息队列演示程序
//!
//! 连接 Kafka，订阅一个纯文本 topic 和一个 JSON topic，
//! 各发布几条消息，收到 Ctrl+C 后关闭

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use mq_adapter_kafka::{KafkaConfig, KafkaMessageQueue};
use mq_config::AppConfig;
use mq_dispatch::{AsyncStructSubscriber, Decoder, StructSubscriber};
use mq_ports::{KeyedMessage, Logger, MessageQueue, Topic};
use mq_telemetry::{TracingLogger, init_metrics, init_tracing, init_tracing_json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const TEXT_TOPIC: &str = "mq-demo-text";
const ORDER_TOPIC: &str = "mq-demo-orders";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: u64,
    customer: String,
    amount_cents: i64,
    placed_at: DateTime<Utc>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_dir = std::env::var("MQ_CONFIG_DIR").unwrap_or_else(|_| "demo/config".to_string());
    let config = AppConfig::load(&config_dir).context("failed to load config")?;

    if config.is_production() || config.telemetry.json {
        init_tracing_json(&config.telemetry.log_level)?;
    } else {
        init_tracing(&config.telemetry.log_level)?;
    }
    let metrics = init_metrics()?;

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Starting demo"
    );

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);
    let kafka_config = KafkaConfig::from_settings(&config.kafka)
        .with_client_id(config.app_name.clone())
        .with_logger(logger.clone());
    let queue = KafkaMessageQueue::connect(kafka_config).await?;

    let text_topic = Topic::new(TEXT_TOPIC)?;
    let order_topic = Topic::new(ORDER_TOPIC)?;

    let printer = StructSubscriber::new(Decoder::<String>::text(), |text| {
        info!(%text, "Text message received");
        true
    })
    .with_logger(logger.clone());
    queue
        .subscribe(&text_topic, "mq-demo-printer", Arc::new(printer))
        .await?;

    let (orders, pool) = AsyncStructSubscriber::spawn(
        Decoder::<OrderPlaced>::json(),
        |order: OrderPlaced| async move {
            info!(
                order_id = order.order_id,
                customer = %order.customer,
                amount_cents = order.amount_cents,
                "Order processed"
            );
        },
        4,
    );
    queue
        .subscribe(&order_topic, "mq-demo-billing", Arc::new(orders.with_logger(logger)))
        .await?;

    queue.publish(&text_topic, "hello from mq-demo".into()).await?;
    for order_id in 1..=3 {
        let order = OrderPlaced {
            order_id,
            customer: format!("customer-{}", order_id),
            amount_cents: 1_250 * order_id as i64,
            placed_at: Utc::now(),
        };
        queue.publish_json(&order_topic, &order).await?;
    }
    queue
        .publish(
            &text_topic,
            KeyedMessage::new("customer-1", "keyed hello").into(),
        )
        .await?;

    info!("Messages published, press Ctrl+C to stop");
    shutdown_signal().await;

    queue.close().await?;
    pool.shutdown().await;

    info!(metrics = %metrics.render(), "Demo stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
    }
    info!("Shutdown signal received");
}
