//! Kafka 配置模块
//!
//! `KafkaConfig` 在构造适配器时校验一次，得到不可变的 `BrokerConnection`

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use mq_config::KafkaSettings;
use mq_errors::{MqError, MqResult};
use mq_ports::Logger;
use secrecy::{ExposeSecret, Secret};

use crate::log_bridge::TransportLogBridge;

/// Kafka 安全协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityProtocol {
    /// 明文（默认）
    #[default]
    Plaintext,
    /// SSL
    Ssl,
    /// SASL 明文
    SaslPlaintext,
    /// SASL SSL
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "plaintext",
            SecurityProtocol::Ssl => "ssl",
            SecurityProtocol::SaslPlaintext => "sasl_plaintext",
            SecurityProtocol::SaslSsl => "sasl_ssl",
        }
    }

    pub fn uses_sasl(&self) -> bool {
        matches!(self, SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl)
    }

    pub fn uses_tls(&self) -> bool {
        matches!(self, SecurityProtocol::Ssl | SecurityProtocol::SaslSsl)
    }

    /// 对应的 TLS 协议
    pub fn with_tls(self) -> Self {
        match self {
            SecurityProtocol::Plaintext => SecurityProtocol::Ssl,
            SecurityProtocol::SaslPlaintext => SecurityProtocol::SaslSsl,
            other => other,
        }
    }
}

impl FromStr for SecurityProtocol {
    type Err = MqError;

    fn from_str(s: &str) -> MqResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAINTEXT" => Ok(SecurityProtocol::Plaintext),
            "SSL" => Ok(SecurityProtocol::Ssl),
            "SASL_PLAINTEXT" => Ok(SecurityProtocol::SaslPlaintext),
            "SASL_SSL" => Ok(SecurityProtocol::SaslSsl),
            other => Err(MqError::configuration(format!(
                "kafka config 'protocol' is not supported: {}",
                other
            ))),
        }
    }
}

/// SASL 认证机制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
    OAuthBearer,
}

impl SaslMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
            SaslMechanism::OAuthBearer => "OAUTHBEARER",
        }
    }
}

impl FromStr for SaslMechanism {
    type Err = MqError;

    fn from_str(s: &str) -> MqResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(SaslMechanism::Plain),
            "SCRAM-SHA-256" => Ok(SaslMechanism::ScramSha256),
            "SCRAM-SHA-512" => Ok(SaslMechanism::ScramSha512),
            "OAUTHBEARER" => Ok(SaslMechanism::OAuthBearer),
            other => Err(MqError::configuration(format!(
                "kafka config 'mechanisms' is not supported: {}",
                other
            ))),
        }
    }
}

/// Kafka 适配器配置
#[derive(Clone)]
pub struct KafkaConfig {
    /// 逗号分隔的 broker 地址列表
    pub brokers: String,
    /// 用户名
    pub username: String,
    /// 密码
    pub password: Secret<String>,
    /// SASL 认证机制名称
    pub mechanisms: String,
    /// 安全协议名称
    pub protocol: String,
    /// CA 证书路径（PEM），设置后启用 TLS
    pub ca_file: Option<String>,
    /// 输出逐条消息的调试日志
    pub is_debug: bool,
    /// 客户端 ID
    pub client_id: Option<String>,
    /// 注入的结构化 logger
    pub logger: Option<Arc<dyn Logger>>,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            username: String::new(),
            password: Secret::new(String::new()),
            mechanisms: String::new(),
            protocol: String::new(),
            ca_file: None,
            is_debug: false,
            client_id: None,
            logger: None,
        }
    }

    /// 从配置文件中的 Kafka 配置创建
    pub fn from_settings(settings: &KafkaSettings) -> Self {
        Self {
            brokers: settings.brokers.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            mechanisms: settings.mechanisms.clone(),
            protocol: settings.protocol.clone(),
            ca_file: settings.ca_file.clone(),
            is_debug: settings.is_debug,
            client_id: None,
            logger: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = Secret::new(password.into());
        self
    }

    pub fn with_mechanisms(mut self, mechanisms: impl Into<String>) -> Self {
        self.mechanisms = mechanisms.into();
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_ca_file(mut self, ca_file: impl Into<String>) -> Self {
        self.ca_file = Some(ca_file.into());
        self
    }

    pub fn with_debug(mut self, is_debug: bool) -> Self {
        self.is_debug = is_debug;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// 校验配置
    ///
    /// 依次检查 brokers、username、password、mechanisms、protocol，
    /// 再加载可选的 CA 证书；任何一步失败都不会访问网络
    pub fn validate(&self) -> MqResult<BrokerConnection> {
        let brokers: Vec<String> = self
            .brokers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if brokers.is_empty() {
            return Err(MqError::configuration("kafka config 'brokers' is empty"));
        }

        if self.username.is_empty() {
            return Err(MqError::configuration("kafka config 'username' is empty"));
        }

        if self.password.expose_secret().is_empty() {
            return Err(MqError::configuration("kafka config 'password' is empty"));
        }

        if self.mechanisms.trim().is_empty() {
            return Err(MqError::configuration("kafka config 'mechanisms' is empty"));
        }
        let mechanism: SaslMechanism = self.mechanisms.parse()?;

        if self.protocol.trim().is_empty() {
            return Err(MqError::configuration("kafka config 'protocol' is empty"));
        }
        let mut protocol: SecurityProtocol = self.protocol.parse()?;

        let ca_pem = match self.ca_file.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => {
                let pem = std::fs::read_to_string(path).map_err(|e| {
                    MqError::configuration(format!("failed to read kafka CA certificate: {}", e))
                })?;
                if !pem.contains("-----BEGIN CERTIFICATE-----") {
                    return Err(MqError::configuration(format!(
                        "kafka CA file contains no PEM certificate: {}",
                        path
                    )));
                }
                protocol = protocol.with_tls();
                Some(pem)
            }
            _ => None,
        };

        Ok(BrokerConnection {
            brokers,
            username: self.username.clone(),
            password: self.password.clone(),
            mechanism,
            protocol,
            ca_pem,
            is_debug: self.is_debug,
            client_id: self.client_id.clone(),
            bridge: TransportLogBridge::new(self.logger.clone()),
        })
    }
}

impl fmt::Debug for KafkaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaConfig")
            .field("brokers", &self.brokers)
            .field("username", &self.username)
            .field("password", &self.password)
            .field("mechanisms", &self.mechanisms)
            .field("protocol", &self.protocol)
            .field("ca_file", &self.ca_file)
            .field("is_debug", &self.is_debug)
            .field("client_id", &self.client_id)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// 校验后的 broker 连接参数，构造后不可变
#[derive(Debug, Clone)]
pub struct BrokerConnection {
    brokers: Vec<String>,
    username: String,
    password: Secret<String>,
    mechanism: SaslMechanism,
    protocol: SecurityProtocol,
    ca_pem: Option<String>,
    is_debug: bool,
    client_id: Option<String>,
    bridge: TransportLogBridge,
}

impl BrokerConnection {
    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &Secret<String> {
        &self.password
    }

    pub fn mechanism(&self) -> SaslMechanism {
        self.mechanism
    }

    pub fn protocol(&self) -> SecurityProtocol {
        self.protocol
    }

    pub fn ca_pem(&self) -> Option<&str> {
        self.ca_pem.as_deref()
    }

    pub fn is_debug(&self) -> bool {
        self.is_debug
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// 传输层诊断日志桥
    pub fn bridge(&self) -> &TransportLogBridge {
        &self.bridge
    }

    /// 转换为 rdkafka ClientConfig 的配置项
    pub fn to_client_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = vec![
            ("bootstrap.servers".to_string(), self.brokers.join(",")),
            (
                "security.protocol".to_string(),
                self.protocol.as_str().to_string(),
            ),
            ("socket.timeout.ms".to_string(), "10000".to_string()),
            ("allow.auto.create.topics".to_string(), "true".to_string()),
        ];

        if let Some(client_id) = &self.client_id {
            entries.push(("client.id".to_string(), client_id.clone()));
        }

        if self.protocol.uses_sasl() {
            entries.push((
                "sasl.mechanism".to_string(),
                self.mechanism.as_str().to_string(),
            ));
            entries.push(("sasl.username".to_string(), self.username.clone()));
            entries.push((
                "sasl.password".to_string(),
                self.password.expose_secret().clone(),
            ));
        }

        if let Some(ca_pem) = &self.ca_pem {
            entries.push(("ssl.ca.pem".to_string(), ca_pem.clone()));
            // 只校验证书链，不校验主机名
            entries.push((
                "ssl.endpoint.identification.algorithm".to_string(),
                "none".to_string(),
            ));
        }

        entries
    }

    /// Producer 配置项：立即发送，不做客户端批量
    pub fn to_producer_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = self.to_client_config_entries();

        entries.push(("linger.ms".to_string(), "0".to_string()));
        entries.push(("acks".to_string(), "-1".to_string()));
        entries.push(("request.timeout.ms".to_string(), "30000".to_string()));

        entries
    }

    /// Consumer 配置项：手动提交
    pub fn to_consumer_config_entries(&self, group_id: &str) -> Vec<(String, String)> {
        let mut entries = self.to_client_config_entries();

        entries.push(("group.id".to_string(), group_id.to_string()));
        entries.push(("enable.auto.commit".to_string(), "false".to_string()));
        entries.push(("auto.offset.reset".to_string(), "earliest".to_string()));
        entries.push(("enable.partition.eof".to_string(), "false".to_string()));
        entries.push(("fetch.min.bytes".to_string(), "10000".to_string()));
        entries.push(("fetch.max.bytes".to_string(), "10000000".to_string()));
        entries.push(("session.timeout.ms".to_string(), "45000".to_string()));
        entries.push((
            "topic.metadata.refresh.interval.ms".to_string(),
            "60000".to_string(),
        ));

        entries
    }
}
