//! 日志协作者接口
//!
//! 适配器通过构造参数注入 `Logger`，不依赖进程级全局 logger

use std::fmt;

/// 结构化日志字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: &'static str,
    pub value: String,
}

impl Field {
    pub fn string(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    pub fn display(key: &'static str, value: &dyn fmt::Display) -> Self {
        Self {
            key,
            value: value.to_string(),
        }
    }

    pub fn int(key: &'static str, value: i64) -> Self {
        Self::display(key, &value)
    }

    pub fn error(value: &dyn std::error::Error) -> Self {
        Self::display("error", &value)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// 分级结构化日志
pub trait Logger: Send + Sync {
    fn info(&self, msg: &str, fields: &[Field]);

    fn warn(&self, msg: &str, fields: &[Field]);

    fn error(&self, msg: &str, fields: &[Field]);

    fn debug(&self, msg: &str, fields: &[Field]);
}

/// 将字段列表格式化为 `k1=v1 k2=v2`
pub struct DisplayFields<'a>(pub &'a [Field]);

impl fmt::Display for DisplayFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}
