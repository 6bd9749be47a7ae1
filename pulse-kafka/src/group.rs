//! # Kafka 消费组
//!
//! 一次 `consume` 调用对应一个会话，会话由 [`crate::session`] 桥接到回调。

use crate::{
    config::consumer_config,
    context::GroupContext,
    errors::KafkaGroupError,
    session::{GroupTransport, SessionBridge},
};
use pulse::{ConsumerGroup, GroupHandler, InboundMessage, config::GroupConfig, errors::GroupError};
use rdkafka::{
    Message, Offset, TopicPartitionList,
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::{KafkaError, RDKafkaErrorCode},
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

impl GroupTransport for StreamConsumer<GroupContext> {
    async fn next_message(&self) -> Result<InboundMessage, KafkaError> {
        StreamConsumer::recv(self).await.map(|m| detach(&m))
    }

    fn mark(&self, msg: &InboundMessage) {
        let mut tpl = TopicPartitionList::new();
        if let Err(e) =
            tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
        {
            warn!("添加偏移量{}到主题分区{}|{}失败：{e}", msg.offset, msg.topic, msg.partition);
            return;
        }
        if let Err(e) = self.store_offsets(&tpl) {
            warn!("标记偏移量{}到主题分区{}|{}失败：{e}", msg.offset, msg.topic, msg.partition);
        }
    }
}

/// Kafka 消费组客户端
pub struct KafkaGroup {
    group_id: String,
    consumer: Arc<StreamConsumer<GroupContext>>,
    bridge: SessionBridge<StreamConsumer<GroupContext>>,
    subscribed: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl KafkaGroup {
    /// 创建消费组客户端，订阅延迟到首次 `consume`
    pub fn new(bootstrap: &str, group_id: &str, cfg: &GroupConfig) -> Result<Self, KafkaError> {
        let (context, events) = GroupContext::new(group_id);
        let consumer: Arc<StreamConsumer<GroupContext>> = Arc::new(
            consumer_config(bootstrap, group_id, cfg).create_with_context(context)?,
        );
        info!("成功创建消费组 {group_id} 客户端");
        Ok(Self {
            group_id: group_id.to_string(),
            bridge: SessionBridge::new(group_id, Arc::clone(&consumer), events, cfg.claim_buffer),
            consumer,
            subscribed: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }
}

impl ConsumerGroup for KafkaGroup {
    type Error = KafkaGroupError;

    #[instrument(name = "consume_session", skip_all, fields(group_id = %self.group_id))]
    async fn consume<H: GroupHandler>(
        &self,
        shutdown: &CancellationToken,
        topics: &[String],
        handler: Arc<H>,
    ) -> Result<(), Self::Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GroupError::Closed.into());
        }
        {
            let mut subscribed = self.subscribed.lock().await;
            if *subscribed != topics {
                let names: Vec<&str> = topics.iter().map(String::as_str).collect();
                self.consumer.subscribe(&names)?;
                *subscribed = topics.to_vec();
                info!("成功订阅主题：{topics:?}");
            }
        }
        self.bridge.run(shutdown, handler).await
    }

    fn close(&self) -> Result<(), Self::Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => info!("已提交标记的偏移量"),
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                debug!("无待提交的偏移量")
            }
            Err(e) => warn!("关闭前提交偏移量失败：{e}"),
        }
        self.consumer.unsubscribe();
        info!("消费组 {} 客户端已关闭", self.group_id);
        Ok(())
    }
}

pub(crate) fn detach<M: Message>(m: &M) -> InboundMessage {
    InboundMessage {
        topic: m.topic().to_string(),
        partition: m.partition(),
        offset: m.offset(),
        key: m.key().map(<[u8]>::to_vec),
        payload: m.payload().map(<[u8]>::to_vec),
    }
}
