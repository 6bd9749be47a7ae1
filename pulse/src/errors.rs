//! # **pulse** 错误定义

use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置源加载或反序列化错误
    #[error("配置加载错误：{0}")]
    Source(#[from] config::ConfigError),
    /// 配置验证错误
    #[error("配置'{section}.{key}'验证失败：{message}")]
    ValidationError {
        /// 配置段
        section: String,
        /// 配置键
        key: String,
        /// 验证信息
        message: String,
    },
    /// 命名配置不存在
    #[error("配置'{section}.{key}'不存在")]
    Missing {
        /// 配置段
        section: String,
        /// 配置键
        key: String,
    },
}

/// 消息体解码错误
#[derive(Debug, Error)]
pub enum DecodeError {
    /// 空消息体
    #[error("空消息体")]
    Empty,
    /// JSON 格式错误
    #[error("JSON解码错误：{0}")]
    Json(#[from] serde_json::Error),
}

/// 会话回调错误
#[derive(Debug, Error)]
pub enum HandlerError {
    /// 会话建立失败
    #[error("会话建立失败：{0}")]
    Setup(String),
    /// 分区消费失败
    #[error("分区{topic}[{partition}]消费失败：{message}")]
    Claim {
        /// 主题
        topic: String,
        /// 分区
        partition: i32,
        /// 错误信息
        message: String,
    },
    /// 会话清理失败
    #[error("会话清理失败：{0}")]
    Cleanup(String),
}

/// 消费组错误
#[derive(Debug, Error)]
pub enum GroupError {
    /// 传输层或再平衡错误
    #[error("消费组传输错误：{0}")]
    Transport(String),
    /// 会话回调错误
    #[error("会话回调错误")]
    Handler(#[from] HandlerError),
    /// 消费组已关闭
    #[error("消费组已关闭")]
    Closed,
}
