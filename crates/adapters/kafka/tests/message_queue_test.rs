//! 消息队列适配器测试（进程内传输层）

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mq_adapter_kafka::{KafkaConfig, KafkaMessageQueue, MemoryTransport};
use mq_dispatch::{AsyncStructSubscriber, Decoder, StructSubscriber};
use mq_errors::MqError;
use mq_ports::{
    Field, InboundMessage, KeyedMessage, Logger, MessageQueue, Payload, Subscriber, Topic,
};
use serde::{Deserialize, Serialize};
use tokio_test::{assert_err, assert_ok};

fn config() -> KafkaConfig {
    KafkaConfig::new("memory:9092")
        .with_credentials("develop", "secret")
        .with_mechanisms("PLAIN")
        .with_protocol("PLAINTEXT")
}

async fn connect(transport: &MemoryTransport) -> KafkaMessageQueue<MemoryTransport> {
    KafkaMessageQueue::with_transport(config(), transport.clone())
        .await
        .unwrap()
}

fn topic(name: &str) -> Topic {
    Topic::new(name).unwrap()
}

async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// 记录投递与错误；前 `failures` 次投递返回 false
#[derive(Default)]
struct Recorder {
    failures: AtomicUsize,
    deliveries: Mutex<Vec<InboundMessage>>,
    errors: Mutex<Vec<(bool, MqError)>>,
}

impl Recorder {
    fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Default::default()
        }
    }

    fn delivered(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    fn payloads(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.payload_str().into_owned())
            .collect()
    }

    fn errors(&self) -> Vec<(bool, MqError)> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl Subscriber for Recorder {
    async fn handle_message(&self, message: &InboundMessage) -> bool {
        self.deliveries.lock().unwrap().push(message.clone());
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    fn handle_error(&self, message: Option<&InboundMessage>, error: &MqError) {
        self.errors
            .lock()
            .unwrap()
            .push((message.is_some(), error.clone()));
    }
}

#[derive(Default)]
struct CapturingLogger {
    lines: Mutex<Vec<(&'static str, String)>>,
}

impl CapturingLogger {
    fn has(&self, level: &str, msg: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(l, m)| *l == level && m == msg)
    }

    fn count(&self, level: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    fn push(&self, level: &'static str, msg: &str) {
        self.lines.lock().unwrap().push((level, msg.to_string()));
    }
}

impl Logger for CapturingLogger {
    fn info(&self, msg: &str, _fields: &[Field]) {
        self.push("info", msg);
    }

    fn warn(&self, msg: &str, _fields: &[Field]) {
        self.push("warn", msg);
    }

    fn error(&self, msg: &str, _fields: &[Field]) {
        self.push("error", msg);
    }

    fn debug(&self, msg: &str, _fields: &[Field]) {
        self.push("debug", msg);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u32,
    item: String,
}

#[tokio::test]
async fn test_rejected_message_is_redelivered_until_accepted() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let recorder = Arc::new(Recorder::failing(2));

    queue
        .subscribe(&topic("orders"), "billing", recorder.clone())
        .await
        .unwrap();
    queue.publish(&topic("orders"), "order-1".into()).await.unwrap();

    wait_until(|| transport.committed_offset("orders", "billing") == Some(1)).await;
    assert_eq!(recorder.delivered(), 3);
    assert_eq!(transport.commit_count(), 1);
    assert!(recorder.payloads().iter().all(|p| p == "order-1"));

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_resubscribe_resumes_after_committed_offset() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let first = Arc::new(Recorder::default());

    let id = queue
        .subscribe(&topic("orders"), "billing", first.clone())
        .await
        .unwrap();
    queue.publish(&topic("orders"), "a".into()).await.unwrap();
    queue.publish(&topic("orders"), "b".into()).await.unwrap();
    wait_until(|| transport.committed_offset("orders", "billing") == Some(2)).await;
    queue.unsubscribe(id).await.unwrap();

    let second = Arc::new(Recorder::default());
    queue
        .subscribe(&topic("orders"), "billing", second.clone())
        .await
        .unwrap();
    queue.publish(&topic("orders"), "c".into()).await.unwrap();

    wait_until(|| second.delivered() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(second.payloads(), vec!["c".to_string()]);
    assert_eq!(first.payloads(), vec!["a".to_string(), "b".to_string()]);

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_json_round_trip_with_struct_subscriber() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let received = Arc::new(Mutex::new(Vec::new()));

    let sink = received.clone();
    let subscriber = StructSubscriber::new(Decoder::<Order>::json(), move |order| {
        sink.lock().unwrap().push(order);
        true
    });
    queue
        .subscribe(&topic("orders"), "billing", Arc::new(subscriber))
        .await
        .unwrap();

    let order = Order {
        id: 7,
        item: "book".to_string(),
    };
    queue.publish_json(&topic("orders"), &order).await.unwrap();

    wait_until(|| received.lock().unwrap().len() == 1).await;
    assert_eq!(received.lock().unwrap()[0], order);
    assert_eq!(
        transport.records("orders")[0].payload_str(),
        r#"{"id":7,"item":"book"}"#
    );

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_undecodable_message_is_committed_and_dropped() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let received = Arc::new(Mutex::new(Vec::<Order>::new()));

    let sink = received.clone();
    let subscriber = StructSubscriber::new(Decoder::<Order>::json(), move |order| {
        sink.lock().unwrap().push(order);
        true
    });
    queue
        .subscribe(&topic("orders"), "billing", Arc::new(subscriber))
        .await
        .unwrap();
    queue.publish(&topic("orders"), "not json".into()).await.unwrap();

    wait_until(|| transport.committed_offset("orders", "billing") == Some(1)).await;
    assert!(received.lock().unwrap().is_empty());

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_text_topic() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let received = Arc::new(Mutex::new(Vec::new()));

    let sink = received.clone();
    let subscriber = StructSubscriber::new(Decoder::<String>::text(), move |text| {
        sink.lock().unwrap().push(text);
        true
    });
    queue
        .subscribe(&topic("greetings"), "printer", Arc::new(subscriber))
        .await
        .unwrap();
    queue
        .publish(&topic("greetings"), "hello world".into())
        .await
        .unwrap();

    wait_until(|| received.lock().unwrap().len() == 1).await;
    assert_eq!(received.lock().unwrap()[0], "hello world");

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_invalid_config_fails_before_probe() {
    let transport = MemoryTransport::new();
    let config = KafkaConfig::new("memory:9092")
        .with_credentials("", "secret")
        .with_mechanisms("PLAIN")
        .with_protocol("PLAINTEXT");

    let result = KafkaMessageQueue::with_transport(config, transport.clone()).await;
    let Err(err) = result else {
        panic!("expected configuration error");
    };

    assert!(matches!(err, MqError::Configuration(_)));
    assert!(err.to_string().contains("username"));
    assert_eq!(transport.probe_count(), 0);
}

#[tokio::test]
async fn test_unreachable_broker_fails_connect() {
    let transport = MemoryTransport::new();
    transport.fail_probe(true);

    let result = KafkaMessageQueue::with_transport(config(), transport.clone()).await;
    let Err(err) = result else {
        panic!("expected connectivity error");
    };

    assert!(matches!(err, MqError::Connectivity(_)));
    assert_eq!(transport.probe_count(), 1);
}

#[tokio::test]
async fn test_concurrent_publish_integrity() {
    const PRODUCERS: usize = 4;
    const MESSAGES: usize = 25;

    let transport = MemoryTransport::new();
    let queue = Arc::new(connect(&transport).await);
    let recorder = Arc::new(Recorder::default());
    queue
        .subscribe(&topic("events"), "audit", recorder.clone())
        .await
        .unwrap();

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let queue = queue.clone();
        producers.push(tokio::spawn(async move {
            for m in 0..MESSAGES {
                queue
                    .publish(&topic("events"), format!("p{}-m{}", p, m).into())
                    .await
                    .unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    wait_until(|| recorder.delivered() == PRODUCERS * MESSAGES).await;
    let unique: HashSet<String> = recorder.payloads().into_iter().collect();
    assert_eq!(unique.len(), PRODUCERS * MESSAGES);
    assert_eq!(transport.records("events").len(), PRODUCERS * MESSAGES);

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_async_subscriber_back_pressure() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let spans = Arc::new(Mutex::new(Vec::new()));

    let sink = spans.clone();
    let (subscriber, pool) = AsyncStructSubscriber::spawn(
        Decoder::<String>::text(),
        move |text: String| {
            let sink = sink.clone();
            async move {
                let start = Instant::now();
                tokio::time::sleep(Duration::from_millis(100)).await;
                sink.lock().unwrap().push((text, start, Instant::now()));
            }
        },
        1,
    );
    queue
        .subscribe(&topic("jobs"), "workers", Arc::new(subscriber))
        .await
        .unwrap();

    queue.publish(&topic("jobs"), "first".into()).await.unwrap();
    queue.publish(&topic("jobs"), "second".into()).await.unwrap();

    wait_until(|| spans.lock().unwrap().len() == 2).await;
    {
        let spans = spans.lock().unwrap();
        assert_eq!(spans[0].0, "first");
        assert_eq!(spans[1].0, "second");
        assert!(spans[1].1 >= spans[0].2);
    }

    wait_until(|| transport.committed_offset("jobs", "workers") == Some(2)).await;
    assert_ok!(queue.close().await);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_dropped_worker_pool_backs_off_instead_of_spinning() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let logger = Arc::new(CapturingLogger::default());

    let (subscriber, pool) =
        AsyncStructSubscriber::spawn(Decoder::<String>::text(), |_text: String| async {}, 2);
    drop(pool);
    let subscriber = subscriber.with_logger(logger.clone());
    queue
        .subscribe(&topic("jobs"), "workers", Arc::new(subscriber))
        .await
        .unwrap();
    queue.publish(&topic("jobs"), "orphan".into()).await.unwrap();

    wait_until(|| logger.count("error") >= 1).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let errors = logger.count("error");
    assert!(errors <= 5, "read loop retried {} times in 300ms", errors);
    assert_eq!(transport.committed_offset("jobs", "workers"), None);

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_keyed_publish_attaches_non_empty_key_only() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;

    queue
        .publish(&topic("users"), KeyedMessage::new("", "anonymous").into())
        .await
        .unwrap();
    queue
        .publish(&topic("users"), KeyedMessage::new("user-1", "named").into())
        .await
        .unwrap();

    let records = transport.records("users");
    assert_eq!(records[0].key(), None);
    assert_eq!(records[0].payload_str(), "anonymous");
    assert_eq!(records[1].key(), Some(b"user-1".as_slice()));
    assert_eq!(records[1].payload_str(), "named");

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_empty_payload_is_rejected_before_write() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;

    let text = queue.publish(&topic("orders"), "".into()).await;
    assert!(matches!(text, Err(MqError::InvalidMessage(_))));

    let bytes = queue.publish(&topic("orders"), Payload::Bytes(Vec::new())).await;
    assert!(matches!(bytes, Err(MqError::InvalidMessage(_))));

    assert!(transport.records("orders").is_empty());
    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_write_failure_is_returned_to_caller() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    transport.fail_writes(true);

    let err = assert_err!(queue.publish(&topic("orders"), "lost".into()).await);
    assert!(matches!(err, MqError::Delivery(_)));

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_commit_failure_is_reported_and_loop_continues() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let recorder = Arc::new(Recorder::default());
    transport.fail_next_commits(1);

    queue
        .subscribe(&topic("orders"), "billing", recorder.clone())
        .await
        .unwrap();
    queue.publish(&topic("orders"), "a".into()).await.unwrap();
    queue.publish(&topic("orders"), "b".into()).await.unwrap();

    wait_until(|| transport.committed_offset("orders", "billing") == Some(2)).await;
    assert_eq!(recorder.delivered(), 2);
    let errors = recorder.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].0);
    assert!(matches!(errors[0].1, MqError::Commit(_)));

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_transient_fetch_errors_are_reported_and_retried() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let recorder = Arc::new(Recorder::default());
    transport.inject_fetch_errors(2);

    queue
        .subscribe(&topic("orders"), "billing", recorder.clone())
        .await
        .unwrap();
    queue.publish(&topic("orders"), "a".into()).await.unwrap();

    wait_until(|| recorder.delivered() == 1).await;
    let errors = recorder.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|(has_message, e)| !has_message && e.is_transient()));

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_stream_closed_ends_subscription() {
    let transport = MemoryTransport::new();
    let logger = Arc::new(CapturingLogger::default());
    let queue = KafkaMessageQueue::with_transport(
        config().with_logger(logger.clone()),
        transport.clone(),
    )
    .await
    .unwrap();
    let recorder = Arc::new(Recorder::default());

    queue
        .subscribe(&topic("orders"), "billing", recorder.clone())
        .await
        .unwrap();
    assert_eq!(queue.subscription_count(), 1);

    transport.close_readers();
    wait_until(|| queue.subscription_count() == 0).await;
    assert!(logger.has("error", "Kafka stream closed"));

    queue.publish(&topic("orders"), "a".into()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.delivered(), 0);

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_debug_mode_logs_each_message() {
    let transport = MemoryTransport::new();
    let logger = Arc::new(CapturingLogger::default());
    let queue = KafkaMessageQueue::with_transport(
        config().with_debug(true).with_logger(logger.clone()),
        transport.clone(),
    )
    .await
    .unwrap();
    assert!(logger.has("info", "Kafka message queue connected"));

    let recorder = Arc::new(Recorder::default());
    queue
        .subscribe(&topic("orders"), "billing", recorder.clone())
        .await
        .unwrap();
    queue.publish(&topic("orders"), "a".into()).await.unwrap();

    wait_until(|| recorder.delivered() == 1).await;
    assert!(logger.has("debug", "Message received"));

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_unsubscribe() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let recorder = Arc::new(Recorder::default());

    let id = queue
        .subscribe(&topic("orders"), "billing", recorder.clone())
        .await
        .unwrap();
    queue.unsubscribe(id).await.unwrap();
    assert_eq!(queue.subscription_count(), 0);

    let err = assert_err!(queue.unsubscribe(id).await);
    assert!(matches!(err, MqError::Configuration(_)));

    assert_ok!(queue.close().await);
}

#[tokio::test]
async fn test_close_is_idempotent_and_final() {
    let transport = MemoryTransport::new();
    let queue = connect(&transport).await;
    let recorder = Arc::new(Recorder::default());
    queue
        .subscribe(&topic("orders"), "billing", recorder.clone())
        .await
        .unwrap();
    queue
        .subscribe(&topic("orders"), "audit", recorder.clone())
        .await
        .unwrap();
    assert_eq!(queue.subscription_count(), 2);

    assert_ok!(queue.close().await);
    assert_eq!(queue.subscription_count(), 0);
    assert_ok!(queue.close().await);

    let publish = queue.publish(&topic("orders"), "late".into()).await;
    assert!(matches!(publish, Err(MqError::Connectivity(_))));

    let subscribe = queue
        .subscribe(&topic("orders"), "billing", recorder.clone())
        .await;
    assert!(matches!(subscribe, Err(MqError::Connectivity(_))));
}
