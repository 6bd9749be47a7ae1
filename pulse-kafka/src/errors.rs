//! # **pulse-kafka** 错误定义

use pulse::errors::{ConfigError, GroupError};
use thiserror::Error;

/// Kafka 消费组错误
#[derive(Debug, Error)]
pub enum KafkaGroupError {
    #[error("Kafka错误：{0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    #[error(transparent)]
    Group(#[from] GroupError),
}

/// 应用启动错误
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("客户端创建失败：{0}")]
    Client(#[from] rdkafka::error::KafkaError),
}
