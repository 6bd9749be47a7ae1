//! # 事件
//!
//! 线上载荷为 UTF-8 JSON：`{"type", "id", "data", "timestamp"}`。

use crate::errors::DecodeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 事件结构
///
/// 解码时缺失或为 `null` 的字段取零值，未知字段被忽略。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    /// 事件类型
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    /// 事件 Id，兼作分区路由键
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    /// 事件数据
    #[serde(deserialize_with = "null_as_default")]
    pub data: String,
    /// 事件时间
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// 构造事件
    pub fn new(kind: impl Into<String>, id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            data: data.into(),
            timestamp: Utc::now(),
        }
    }

    /// 编码为 JSON
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// 从 JSON 解码
    pub fn from_bytes(payload: Option<&[u8]>) -> Result<Self, DecodeError> {
        let bytes = payload.ok_or(DecodeError::Empty)?;
        let event: Option<Self> = serde_json::from_slice(bytes)?;
        Ok(event.unwrap_or_default())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
