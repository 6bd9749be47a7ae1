//! # **pulse** 配置
//!
//! 配置分层加载：`default`、`PULSE_ENV` 对应环境文件（缺省为 `dev`），最后叠加
//! `PULSE` 前缀的环境变量。

use crate::errors::ConfigError;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf, time::Duration};
use validator::{Validate, ValidationError};

/// 构建分层配置
pub fn build_config(crate_dir: PathBuf) -> Result<Config, ConfigError> {
    let config_root = std::env::var("PULSE_CONFIG_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| crate_dir.join("config"));
    let env = std::env::var("PULSE_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = Config::builder()
        .add_source(File::from(config_root.join("default")).required(false))
        .add_source(File::from(config_root.join(env)).required(false))
        .add_source(
            Environment::with_prefix("PULSE")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("topics")
                .try_parsing(true),
        )
        .build()?;
    Ok(config)
}

/// 加载并验证全部配置
pub fn load_settings(crate_dir: PathBuf) -> Result<Settings, ConfigError> {
    let config = build_config(crate_dir)?;
    let settings = config.try_deserialize::<Settings>()?;
    settings.validate().map_err(|e| ConfigError::ValidationError {
        section: "root".to_string(),
        key: "settings".to_string(),
        message: e.to_string(),
    })?;
    Ok(settings)
}

/// 解码失败消息的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// 跳过且不标记偏移量，重新投递时会再次跳过
    #[default]
    Skip,
    /// 跳过并标记偏移量，坏消息随后续提交一并越过
    Commit,
}

/// 投递失败消息的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    /// 记录错误后丢弃
    #[default]
    Drop,
    /// 交由客户端库按 `send_retries` 重试，最终失败仍记录后丢弃
    Retry,
}

/// 全局配置
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    /// Kafka 集群地址
    #[validate(length(min = 1))]
    pub bootstrap: String,
    /// 共享的主题命名空间
    #[validate(length(min = 1))]
    pub topics: Vec<String>,
    /// 各消费组配置
    #[serde(default)]
    #[validate(nested)]
    pub groups: HashMap<String, GroupConfig>,
    /// 生产者配置
    #[serde(default)]
    #[validate(nested)]
    pub producer: ProducerConfig,
}

impl Settings {
    /// 获取指定消费组配置，并校验其主题均属于共享命名空间
    pub fn group(&self, group_id: &str) -> Result<GroupConfig, ConfigError> {
        let cfg = self
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| ConfigError::Missing {
                section: "groups".to_string(),
                key: group_id.to_string(),
            })?;
        if let Some(topic) = cfg.topics.iter().find(|t| !self.topics.contains(t)) {
            return Err(ConfigError::ValidationError {
                section: "groups".to_string(),
                key: group_id.to_string(),
                message: format!("主题'{topic}'不在共享主题列表中"),
            });
        }
        Ok(cfg)
    }
}

/// 消费组配置
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct GroupConfig {
    /// 订阅的主题
    #[validate(length(min = 1))]
    pub topics: Vec<String>,
    /// 解码失败策略
    pub decode_failure: DecodePolicy,
    /// 每个分区认领的消息缓冲容量
    #[validate(range(min = 1))]
    pub claim_buffer: usize,
    /// 消费循环出错后的重试间隔
    pub retry_backoff_ms: u64,
    /// 透传给客户端库的额外设置
    pub settings: HashMap<String, String>,
}

impl GroupConfig {
    /// 重试间隔
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            decode_failure: DecodePolicy::Skip,
            claim_buffer: 256,
            retry_backoff_ms: 1000,
            settings: HashMap::new(),
        }
    }
}

/// 生产者配置
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_pause"))]
pub struct ProducerConfig {
    /// 两次发送之间的最短停顿
    pub min_pause_ms: u64,
    /// 两次发送之间的最长停顿
    pub max_pause_ms: u64,
    /// 异步输入通道容量
    #[validate(range(min = 1))]
    pub input_buffer: usize,
    /// 单条消息投递超时
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    /// 投递失败策略
    pub send_failure: SendPolicy,
    /// 重试次数，仅在 `send_failure = "retry"` 时生效
    pub send_retries: u32,
    /// 各主题可生成的事件类型
    pub event_types: HashMap<String, Vec<String>>,
    /// 透传给客户端库的额外设置
    pub settings: HashMap<String, String>,
}

impl ProducerConfig {
    /// 停顿区间
    pub fn pause(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.min_pause_ms),
            Duration::from_millis(self.max_pause_ms),
        )
    }

    /// 投递超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        let event_types = [
            ("orders", ["order_created", "order_updated", "order_canceled"]),
            ("payments", ["payment_received", "payment_failed", "payment_refunded"]),
            ("notifications", ["email_sent", "sms_sent", "push_notification"]),
        ]
        .into_iter()
        .map(|(topic, types)| {
            (
                topic.to_string(),
                types.iter().map(|t| t.to_string()).collect(),
            )
        })
        .collect();
        Self {
            min_pause_ms: 500,
            max_pause_ms: 1500,
            input_buffer: 256,
            timeout_secs: 45,
            send_failure: SendPolicy::Drop,
            send_retries: 3,
            event_types,
            settings: HashMap::new(),
        }
    }
}

fn validate_pause(cfg: &ProducerConfig) -> Result<(), ValidationError> {
    if cfg.min_pause_ms > cfg.max_pause_ms {
        return Err(ValidationError::new("pause_range"));
    }
    Ok(())
}
