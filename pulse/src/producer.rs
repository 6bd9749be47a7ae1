//! # 异步生产管道
//!
//! 异步生产者以三个通道对外：输入通道接收待发送记录，成功与失败两个结果通道回报
//! 投递结果。丢弃输入通道即请求异步关闭，生产者随后完成在途投递并关闭两个结果通道。

use crate::{config::ProducerConfig, event::Event};
use chrono::Utc;
use rand::{Rng, seq::IndexedRandom};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// 待发送记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    /// 目标主题
    pub topic: String,
    /// 分区路由键
    pub key: String,
    /// 消息体
    pub payload: Vec<u8>,
}

/// 投递成功回报
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// 主题
    pub topic: String,
    /// 分区
    pub partition: i32,
    /// 偏移量
    pub offset: i64,
    /// 分区路由键
    pub key: String,
}

/// 投递失败回报
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// 失败的记录
    pub record: OutboundRecord,
    /// 错误信息
    pub error: String,
}

/// 异步生产者通道
pub struct ProducerChannels {
    /// 输入通道
    pub input: mpsc::Sender<OutboundRecord>,
    /// 投递成功序列
    pub successes: mpsc::UnboundedReceiver<Delivered>,
    /// 投递失败序列
    pub errors: mpsc::UnboundedReceiver<DeliveryFailure>,
}

/// 管道运行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineReport {
    /// 被输入通道接受的记录数
    pub sent: u64,
    /// 投递成功数
    pub delivered: u64,
    /// 投递失败数
    pub failed: u64,
}

/// 随机事件生成器
///
/// 无限迭代：随机主题、该主题下的随机事件类型、`evt-<纳秒时间戳>` 形式的 Id。
pub struct EventFactory {
    topics: Vec<String>,
    event_types: HashMap<String, Vec<String>>,
}

impl EventFactory {
    /// 构造生成器，`event_types` 中缺失的主题以 `<topic>_event` 为事件类型
    pub fn new(topics: Vec<String>, event_types: HashMap<String, Vec<String>>) -> Self {
        Self {
            topics,
            event_types,
        }
    }
}

impl Iterator for EventFactory {
    type Item = (String, Event);

    fn next(&mut self) -> Option<Self::Item> {
        let mut rng = rand::rng();
        let topic = self.topics.choose(&mut rng)?.clone();
        let kind = self
            .event_types
            .get(&topic)
            .and_then(|types| types.choose(&mut rng))
            .cloned()
            .unwrap_or_else(|| format!("{topic}_event"));
        let now = Utc::now();
        let id = format!("evt-{}", now.timestamp_nanos_opt().unwrap_or_default());
        let event = Event {
            kind,
            id,
            data: format!("data-{}", rng.random_range(0..1000)),
            timestamp: now,
        };
        Some((topic, event))
    }
}

/// 异步生产管道
pub struct Pipeline {
    channels: ProducerChannels,
    min_pause: Duration,
    max_pause: Duration,
}

impl Pipeline {
    /// 构造管道
    pub fn new(channels: ProducerChannels, cfg: &ProducerConfig) -> Self {
        let (min_pause, max_pause) = cfg.pause();
        Self {
            channels,
            min_pause,
            max_pause,
        }
    }

    /// 设置两次发送之间的停顿区间
    pub fn with_pause(mut self, min: Duration, max: Duration) -> Self {
        self.min_pause = min;
        self.max_pause = max.max(min);
        self
    }

    /// 发送 `events` 直至中断或事件耗尽，随后异步关闭并等待两个结果序列排空
    #[instrument(name = "producer_pipeline", skip_all)]
    pub async fn run<I>(self, events: I, interrupt: CancellationToken) -> PipelineReport
    where
        I: IntoIterator<Item = (String, Event)>,
    {
        let Pipeline {
            channels:
                ProducerChannels {
                    input,
                    successes,
                    errors,
                },
            min_pause,
            max_pause,
        } = self;
        let acks = tokio::spawn(drain_successes(successes));
        let fails = tokio::spawn(drain_errors(errors));

        let mut sent = 0;
        for (topic, event) in events {
            let payload = match event.to_bytes() {
                Ok(payload) => payload,
                Err(e) => {
                    error!("事件{}编码失败：{e}", event.id);
                    continue;
                }
            };
            let record = OutboundRecord {
                topic,
                key: event.id.clone(),
                payload,
            };

            tokio::select! {
                biased;
                _ = interrupt.cancelled() => {
                    info!("收到中断信号，异步关闭生产者");
                    break;
                }
                permit = input.reserve() => match permit {
                    Ok(permit) => {
                        info!("发送{}至{}", event.kind, record.topic);
                        permit.send(record);
                        sent += 1;
                    }
                    Err(_) => {
                        error!("生产者输入通道已关闭");
                        break;
                    }
                }
            }

            let pause = pause_between(min_pause, max_pause);
            if !pause.is_zero() {
                tokio::select! {
                    _ = interrupt.cancelled() => {}
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        drop(input);
        debug!("等待投递结果序列排空");
        let (delivered, failed) = tokio::join!(join_drain(acks), join_drain(fails));
        info!(sent, delivered, failed, "生产者关闭完成");
        PipelineReport {
            sent,
            delivered,
            failed,
        }
    }
}

fn pause_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::rng().random_range(min..=max)
}

async fn drain_successes(mut successes: mpsc::UnboundedReceiver<Delivered>) -> u64 {
    let mut count = 0;
    while let Some(d) = successes.recv().await {
        info!(key = %d.key, offset = d.offset, "投递至{}[{}]", d.topic, d.partition);
        count += 1;
    }
    count
}

async fn drain_errors(mut errors: mpsc::UnboundedReceiver<DeliveryFailure>) -> u64 {
    let mut count = 0;
    while let Some(f) = errors.recv().await {
        error!(topic = %f.record.topic, key = %f.record.key, "生产者投递错误：{}", f.error);
        count += 1;
    }
    count
}

async fn join_drain(handle: JoinHandle<u64>) -> u64 {
    match handle.await {
        Ok(count) => count,
        Err(e) => {
            error!("结果序列排空任务异常：{e}");
            0
        }
    }
}
