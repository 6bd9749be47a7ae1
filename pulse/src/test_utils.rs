//! # 测试工具
//!
//! 内存中的消费组与异步生产者，按脚本回放会话与投递结果。

use crate::{
    errors::GroupError,
    event::Event,
    group::{Claim, ConsumerGroup, GroupHandler, GroupSession, InboundMessage},
    producer::{Delivered, DeliveryFailure, OutboundRecord, ProducerChannels},
};
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    sync::{Notify, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::error;

/// 消费组调用日志条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    /// 进入消费调用
    Consume,
    /// 消费调用返回
    Return,
    /// 客户端释放
    Close,
}

/// 脚本化的一轮消费调用
pub enum Round {
    /// 一个会话：各分区的消息，`hold` 为真时会话持续到取消
    Session {
        /// 分区认领及其消息
        claims: Vec<(String, i32, Vec<InboundMessage>)>,
        /// 是否保持会话直至取消
        hold: bool,
    },
    /// 消费调用直接返回传输错误
    Fail(String),
}

impl Round {
    /// 消息投递完毕即结束的会话，模拟再平衡
    pub fn rebalance(claims: Vec<(String, i32, Vec<InboundMessage>)>) -> Self {
        Round::Session { claims, hold: false }
    }

    /// 保持至取消的会话
    pub fn steady(claims: Vec<(String, i32, Vec<InboundMessage>)>) -> Self {
        Round::Session { claims, hold: true }
    }
}

/// 构造携带事件 JSON 的消息
pub fn event_message(topic: &str, partition: i32, offset: i64, event: &Event) -> InboundMessage {
    InboundMessage {
        topic: topic.to_string(),
        partition,
        offset,
        key: Some(event.id.clone().into_bytes()),
        payload: event.to_bytes().ok(),
    }
}

/// 构造原始消息
pub fn raw_message(topic: &str, partition: i32, offset: i64, payload: &[u8]) -> InboundMessage {
    InboundMessage {
        topic: topic.to_string(),
        partition,
        offset,
        key: None,
        payload: Some(payload.to_vec()),
    }
}

type Marks = Arc<Mutex<Vec<(String, i32, i64)>>>;

/// 内存会话
pub struct MemorySession {
    group_id: String,
    epoch: u64,
    claims: BTreeMap<String, Vec<i32>>,
    marks: Marks,
}

impl GroupSession for MemorySession {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    fn claims(&self) -> &BTreeMap<String, Vec<i32>> {
        &self.claims
    }

    fn mark_message(&self, msg: &InboundMessage) {
        if let Ok(mut marks) = self.marks.lock() {
            marks.push((msg.topic.clone(), msg.partition, msg.offset));
        }
    }
}

/// 内存消费组
pub struct MemoryGroup {
    group_id: String,
    rounds: Mutex<VecDeque<Round>>,
    journal: Arc<Mutex<Vec<Call>>>,
    marks: Marks,
    epoch: AtomicU64,
}

impl MemoryGroup {
    /// 以脚本构造，脚本耗尽后的消费调用阻塞至取消
    pub fn new(group_id: &str, rounds: Vec<Round>) -> Self {
        Self {
            group_id: group_id.to_string(),
            rounds: Mutex::new(rounds.into()),
            journal: Arc::new(Mutex::new(Vec::new())),
            marks: Arc::new(Mutex::new(Vec::new())),
            epoch: AtomicU64::new(0),
        }
    }

    /// 调用日志句柄
    pub fn journal(&self) -> Arc<Mutex<Vec<Call>>> {
        Arc::clone(&self.journal)
    }

    /// 已标记偏移量句柄
    pub fn marks(&self) -> Arc<Mutex<Vec<(String, i32, i64)>>> {
        Arc::clone(&self.marks)
    }

    fn log(&self, call: Call) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(call);
        }
    }

    fn next_round(&self) -> Option<Round> {
        self.rounds.lock().ok().and_then(|mut rounds| rounds.pop_front())
    }

    async fn play<H: GroupHandler>(
        &self,
        shutdown: &CancellationToken,
        round: Option<Round>,
        handler: Arc<H>,
    ) -> Result<(), GroupError> {
        let (claims, hold) = match round {
            None => {
                shutdown.cancelled().await;
                return Ok(());
            }
            Some(Round::Fail(e)) => return Err(GroupError::Transport(e)),
            Some(Round::Session { claims, hold }) => (claims, hold),
        };

        let mut assigned: BTreeMap<String, Vec<i32>> = BTreeMap::new();
        for (topic, partition, _) in &claims {
            assigned.entry(topic.clone()).or_default().push(*partition);
        }
        let session = Arc::new(MemorySession {
            group_id: self.group_id.clone(),
            epoch: self.epoch.fetch_add(1, Ordering::SeqCst) + 1,
            claims: assigned,
            marks: Arc::clone(&self.marks),
        });
        handler.setup(session.as_ref())?;

        let mut feeders = Vec::new();
        let mut tasks = JoinSet::new();
        for (topic, partition, messages) in claims {
            let (tx, rx) = mpsc::channel(messages.len().max(1));
            for msg in messages {
                let _ = tx.try_send(msg);
            }
            if hold {
                feeders.push(tx);
            }
            let handler = Arc::clone(&handler);
            let session = Arc::clone(&session);
            tasks.spawn(async move {
                if let Err(e) = handler
                    .consume_claim(session.as_ref(), Claim::new(topic, partition, rx))
                    .await
                {
                    error!("{e}");
                }
            });
        }

        if hold {
            shutdown.cancelled().await;
            drop(feeders);
        }
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("分区认领任务异常：{e}");
            }
        }
        handler.cleanup(session.as_ref())?;
        Ok(())
    }
}

impl ConsumerGroup for MemoryGroup {
    type Error = GroupError;

    async fn consume<H: GroupHandler>(
        &self,
        shutdown: &CancellationToken,
        _topics: &[String],
        handler: Arc<H>,
    ) -> Result<(), GroupError> {
        self.log(Call::Consume);
        let round = self.next_round();
        let result = self.play(shutdown, round, handler).await;
        self.log(Call::Return);
        result
    }

    fn close(&self) -> Result<(), GroupError> {
        self.log(Call::Close);
        Ok(())
    }
}

/// 内存异步生产者
///
/// 对失败主题集合中的记录回报失败，其余回报成功；偏移量按主题递增，分区固定为 0。
pub struct MemoryProducer {
    fail_topics: HashSet<String>,
    capacity: usize,
    gate: Option<Arc<Notify>>,
}

impl MemoryProducer {
    /// 构造生产者
    pub fn new(capacity: usize) -> Self {
        Self {
            fail_topics: HashSet::new(),
            capacity,
            gate: None,
        }
    }

    /// 发往该主题的记录均回报失败
    pub fn failing(mut self, topic: &str) -> Self {
        self.fail_topics.insert(topic.to_string());
        self
    }

    /// 在 `gate` 被通知前不读取输入通道
    pub fn stalled(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// 启动后台投递任务，返回通道
    pub fn launch(self) -> ProducerChannels {
        let (input, mut input_rx) = mpsc::channel::<OutboundRecord>(self.capacity);
        let (success_tx, successes) = mpsc::unbounded_channel::<Delivered>();
        let (error_tx, errors) = mpsc::unbounded_channel::<DeliveryFailure>();
        tokio::spawn(async move {
            if let Some(gate) = self.gate {
                gate.notified().await;
            }
            let mut offsets: HashMap<String, i64> = HashMap::new();
            while let Some(record) = input_rx.recv().await {
                if self.fail_topics.contains(&record.topic) {
                    let _ = error_tx.send(DeliveryFailure {
                        record,
                        error: "Broker: Not enough in-sync replicas".to_string(),
                    });
                    continue;
                }
                let offset = offsets.entry(record.topic.clone()).or_insert(-1);
                *offset += 1;
                let _ = success_tx.send(Delivered {
                    topic: record.topic,
                    partition: 0,
                    offset: *offset,
                    key: record.key,
                });
            }
        });
        ProducerChannels {
            input,
            successes,
            errors,
        }
    }
}
