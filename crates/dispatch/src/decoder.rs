//! 消息解码策略

use std::fmt;
use std::sync::Arc;

use mq_errors::{MqError, MqResult};
use serde::de::DeserializeOwned;

/// 解码策略，在构造订阅者时显式选择
pub enum Decoder<M> {
    /// 纯文本：字节原样复制为字符串，不做结构化解析
    Text(fn(String) -> M),
    /// JSON 反序列化
    Json(fn(&[u8]) -> MqResult<M>),
    /// 自定义解码
    Custom(Arc<dyn Fn(&[u8]) -> MqResult<M> + Send + Sync>),
}

impl<M> Decoder<M> {
    /// 纯文本 topic 使用
    pub fn text() -> Self
    where
        M: From<String>,
    {
        Decoder::Text(<M as From<String>>::from)
    }

    pub fn json() -> Self
    where
        M: DeserializeOwned,
    {
        Decoder::Json(decode_json::<M>)
    }

    pub fn custom(decode: impl Fn(&[u8]) -> MqResult<M> + Send + Sync + 'static) -> Self {
        Decoder::Custom(Arc::new(decode))
    }

    pub fn decode(&self, data: &[u8]) -> MqResult<M> {
        match self {
            Decoder::Text(from_text) => Ok(from_text(String::from_utf8_lossy(data).into_owned())),
            Decoder::Json(from_json) => from_json(data),
            Decoder::Custom(decode) => decode(data),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Decoder::Text(_) => "text",
            Decoder::Json(_) => "json",
            Decoder::Custom(_) => "custom",
        }
    }
}

fn decode_json<M: DeserializeOwned>(data: &[u8]) -> MqResult<M> {
    serde_json::from_slice(data)
        .map_err(|e| MqError::serialization(format!("failed to unmarshal message: {}", e)))
}

impl<M> Clone for Decoder<M> {
    fn clone(&self) -> Self {
        match self {
            Decoder::Text(f) => Decoder::Text(*f),
            Decoder::Json(f) => Decoder::Json(*f),
            Decoder::Custom(f) => Decoder::Custom(f.clone()),
        }
    }
}

impl<M> fmt::Debug for Decoder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Decoder").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Order {
        id: u64,
        item: String,
    }

    #[test]
    fn test_text_copies_bytes_verbatim() {
        let decoder = Decoder::<String>::text();
        // 看起来像 JSON 也不解析
        assert_eq!(decoder.decode(br#"{"id":1}"#).unwrap(), r#"{"id":1}"#);
        assert_eq!(decoder.decode(b"").unwrap(), "");
    }

    #[test]
    fn test_json_decodes_struct() {
        let decoder = Decoder::<Order>::json();
        let order = decoder.decode(br#"{"id":7,"item":"book"}"#).unwrap();
        assert_eq!(
            order,
            Order {
                id: 7,
                item: "book".to_string()
            }
        );
    }

    #[test]
    fn test_json_failure_is_serialization_error() {
        let decoder = Decoder::<Order>::json();
        let err = decoder.decode(b"hello world").unwrap_err();
        assert!(matches!(err, MqError::Serialization(_)));
    }

    #[test]
    fn test_custom_decoder() {
        let decoder = Decoder::custom(|data: &[u8]| Ok(data.len()));
        assert_eq!(decoder.decode(b"abc").unwrap(), 3);
        assert_eq!(decoder.clone().kind(), "custom");
    }
}
