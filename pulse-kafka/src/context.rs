//! 再平衡回调运行在客户端库的后台线程，事件经无界通道转交给消费组会话。

use rdkafka::{
    ClientContext,
    consumer::{BaseConsumer, ConsumerContext, Rebalance},
};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// 再平衡事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RebalanceEvent {
    Assigned(Vec<(String, i32)>),
    Revoked(Vec<(String, i32)>),
    Failed(String),
}

pub(crate) struct GroupContext {
    group_id: String,
    events: mpsc::UnboundedSender<RebalanceEvent>,
}

impl GroupContext {
    pub(crate) fn new(
        group_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<RebalanceEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let ctx = Self {
            group_id: group_id.into(),
            events,
        };
        (ctx, rx)
    }

    fn forward(&self, event: RebalanceEvent) {
        if self.events.send(event).is_err() {
            warn!("{} 再平衡事件无人接收", self.group_id);
        }
    }
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(tpl) = rebalance {
            let revoked = partitions(tpl);
            info!("{} 撤销分区：{revoked:?}", self.group_id);
            self.forward(RebalanceEvent::Revoked(revoked));
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(tpl) => {
                let assigned = partitions(tpl);
                info!("{} 分配分区：{assigned:?}", self.group_id);
                self.forward(RebalanceEvent::Assigned(assigned));
            }
            Rebalance::Revoke(_) => {}
            Rebalance::Error(e) => {
                warn!("{} 再平衡错误：{e}", self.group_id);
                self.forward(RebalanceEvent::Failed(e.to_string()));
            }
        }
    }
}

fn partitions(tpl: &rdkafka::TopicPartitionList) -> Vec<(String, i32)> {
    tpl.elements()
        .iter()
        .map(|e| (e.topic().to_string(), e.partition()))
        .collect()
}
