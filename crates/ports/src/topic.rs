//! Topic 定义

use std::fmt;

use mq_errors::{MqError, MqResult};

/// 主题：消息发布与消费的逻辑通道，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// 创建主题，名称不能为空
    pub fn new(name: impl Into<String>) -> MqResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MqError::configuration("topic name is empty"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Topic {
    type Error = MqError;

    fn try_from(value: &str) -> MqResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for Topic {
    type Error = MqError;

    fn try_from(value: String) -> MqResult<Self> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_rejects_empty() {
        assert!(matches!(Topic::new(""), Err(MqError::Configuration(_))));
        assert!(matches!(Topic::new("   "), Err(MqError::Configuration(_))));
    }

    #[test]
    fn test_topic_display() {
        let topic = Topic::try_from("orders").unwrap();
        assert_eq!(topic.to_string(), "orders");
        assert_eq!(topic.as_str(), "orders");
    }
}
