//! # 会话计数回调

use crate::{
    config::DecodePolicy,
    errors::HandlerError,
    event::Event,
    group::{Claim, GroupHandler, GroupSession},
    readiness::Readiness,
    stats::{StatsSnapshot, StatsTable},
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// 按主题/分区统计已消费事件的会话回调
pub struct GroupSessionHandler {
    group_id: String,
    readiness: Arc<Readiness>,
    stats: StatsTable,
    decode_policy: DecodePolicy,
}

impl GroupSessionHandler {
    /// 构造回调，计数表为空
    pub fn new(group_id: impl Into<String>, readiness: Arc<Readiness>) -> Self {
        Self {
            group_id: group_id.into(),
            readiness,
            stats: StatsTable::new(),
            decode_policy: DecodePolicy::default(),
        }
    }

    /// 设置解码失败策略
    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    /// 消费组 Id
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// 计数快照
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl GroupHandler for GroupSessionHandler {
    fn setup(&self, session: &dyn GroupSession) -> Result<(), HandlerError> {
        if !self.readiness.signal() {
            warn!(group_id = %self.group_id, epoch = session.epoch(), "就绪通知已触发，忽略重复通知");
        }
        info!(
            group_id = %self.group_id,
            epoch = session.epoch(),
            "分配分区：{:?}",
            session.claims()
        );
        Ok(())
    }

    #[instrument(
        name = "consume_claim",
        skip_all,
        fields(group_id = %self.group_id, topic = claim.topic(), partition = claim.partition())
    )]
    async fn consume_claim(
        &self,
        session: &dyn GroupSession,
        mut claim: Claim,
    ) -> Result<(), HandlerError> {
        let topic = claim.topic().to_string();
        let partition = claim.partition();
        self.stats.register(&topic, partition);
        debug!("开始消费分区");

        while let Some(msg) = claim.next().await {
            let event = match Event::from_bytes(msg.payload.as_deref()) {
                Ok(event) => event,
                Err(e) => {
                    error!(offset = msg.offset, "解码{}[{}]失败：{e}", msg.topic, msg.partition);
                    if self.decode_policy == DecodePolicy::Commit {
                        session.mark_message(&msg);
                    }
                    continue;
                }
            };

            let count = self.stats.increment_and_get(&msg.topic, msg.partition, msg.offset);
            info!(offset = msg.offset, count, "[{}][{}] {}: {}", msg.topic, msg.partition, event.kind, event.id);
            session.mark_message(&msg);
        }

        debug!("分区消息流结束");
        Ok(())
    }

    fn cleanup(&self, session: &dyn GroupSession) -> Result<(), HandlerError> {
        let snapshot = self.stats.snapshot();
        info!(
            group_id = %self.group_id,
            epoch = session.epoch(),
            "消费汇总：\n{snapshot}"
        );
        Ok(())
    }
}
