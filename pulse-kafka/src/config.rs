//! # Kafka 客户端配置
//!
//! 由已验证的消费组与生产者配置构造 rdkafka 客户端配置。

use pulse::config::{GroupConfig, ProducerConfig, SendPolicy};
use rdkafka::ClientConfig;

/// 构造消费组客户端配置
///
/// 偏移量由会话显式标记后自动提交，透传设置可覆盖缺省值。
pub fn consumer_config(bootstrap: &str, group_id: &str, cfg: &GroupConfig) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", bootstrap)
        .set("group.id", group_id)
        .set("client.id", group_id)
        .set("auto.offset.reset", "earliest")
        .set("partition.assignment.strategy", "range")
        .set("enable.auto.commit", "true")
        .set("enable.auto.offset.store", "false");
    for (key, value) in &cfg.settings {
        config.set(key, value);
    }
    config
}

/// 构造生产者客户端配置
pub fn producer_config(bootstrap: &str, cfg: &ProducerConfig) -> ClientConfig {
    let retries = match cfg.send_failure {
        SendPolicy::Drop => 0,
        SendPolicy::Retry => cfg.send_retries,
    };
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", bootstrap)
        .set("acks", "all")
        .set("partitioner", "murmur2_random")
        .set("message.send.max.retries", retries.to_string())
        .set("message.timeout.ms", cfg.timeout().as_millis().to_string());
    for (key, value) in &cfg.settings {
        config.set(key, value);
    }
    config
}
