//! # 会话桥接
//!
//! 把再平衡事件与消息流转换为三段式会话回调：等待分区分配，按分区派生认领任务并
//! 转发消息，分区撤销、新的分配或取消令牌触发会话结束，全部认领返回后再清理。

use crate::{context::RebalanceEvent, errors::KafkaGroupError};
use ahash::AHashMap;
use pulse::{
    Claim, GroupHandler, GroupSession, InboundMessage,
    errors::{GroupError, HandlerError},
};
use rdkafka::error::KafkaError;
use std::{
    collections::BTreeMap,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 消息来源与偏移量存储
pub trait GroupTransport: Send + Sync + 'static {
    /// 拉取下一条消息
    fn next_message(&self) -> impl Future<Output = Result<InboundMessage, KafkaError>> + Send;

    /// 存储消息的下一个偏移量，待提交
    fn mark(&self, msg: &InboundMessage);
}

type Routes = AHashMap<(String, i32), mpsc::Sender<InboundMessage>>;

struct Inbox {
    events: mpsc::UnboundedReceiver<RebalanceEvent>,
    pending: Option<Vec<(String, i32)>>,
    early: Vec<InboundMessage>,
}

pub(crate) struct SessionBridge<T> {
    group_id: String,
    transport: Arc<T>,
    inbox: Mutex<Inbox>,
    epoch: AtomicU64,
    claim_buffer: usize,
}

impl<T: GroupTransport> SessionBridge<T> {
    pub(crate) fn new(
        group_id: impl Into<String>,
        transport: Arc<T>,
        events: mpsc::UnboundedReceiver<RebalanceEvent>,
        claim_buffer: usize,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            transport,
            inbox: Mutex::new(Inbox {
                events,
                pending: None,
                early: Vec::new(),
            }),
            epoch: AtomicU64::new(0),
            claim_buffer: claim_buffer.max(1),
        }
    }

    async fn await_assignment(
        &self,
        inbox: &mut Inbox,
        shutdown: &CancellationToken,
    ) -> Result<Option<Vec<(String, i32)>>, KafkaGroupError> {
        if let Some(assigned) = inbox.pending.take() {
            return Ok(Some(assigned));
        }
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(None),
                event = inbox.events.recv() => match event {
                    Some(RebalanceEvent::Assigned(assigned)) => return Ok(Some(assigned)),
                    Some(RebalanceEvent::Revoked(revoked)) => {
                        inbox.early.retain(|m| !revoked.contains(&(m.topic.clone(), m.partition)));
                    }
                    Some(RebalanceEvent::Failed(e)) => return Err(GroupError::Transport(e).into()),
                    None => return Err(GroupError::Closed.into()),
                },
                msg = self.transport.next_message() => match msg {
                    Ok(msg) => inbox.early.push(msg),
                    Err(e) => warn!("消息错误：{e}"),
                },
            }
        }
    }

    /// 完成一个会话
    pub(crate) async fn run<H: GroupHandler>(
        &self,
        shutdown: &CancellationToken,
        handler: Arc<H>,
    ) -> Result<(), KafkaGroupError> {
        let mut guard = self.inbox.lock().await;
        let inbox = &mut *guard;
        let Some(assigned) = self.await_assignment(inbox, shutdown).await? else {
            info!("等待分配期间上下文已取消");
            return Ok(());
        };

        let session = Arc::new(KafkaSession {
            group_id: self.group_id.clone(),
            epoch: self.epoch.fetch_add(1, Ordering::AcqRel) + 1,
            claims: claim_map(&assigned),
            transport: Arc::clone(&self.transport),
        });
        handler.setup(session.as_ref()).map_err(GroupError::from)?;

        let mut routes = Routes::new();
        let mut claims = JoinSet::new();
        for (topic, partition) in assigned {
            let (tx, rx) = mpsc::channel(self.claim_buffer);
            routes.insert((topic.clone(), partition), tx);
            let handler = Arc::clone(&handler);
            let session = Arc::clone(&session);
            claims.spawn(async move {
                handler
                    .consume_claim(session.as_ref(), Claim::new(topic, partition, rx))
                    .await
            });
        }
        for msg in std::mem::take(&mut inbox.early) {
            route(&mut routes, msg).await;
        }

        let mut claim_error: Option<HandlerError> = None;
        let outcome: Result<(), KafkaGroupError> = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("上下文已取消，结束会话");
                    break Ok(());
                }
                event = inbox.events.recv() => match event {
                    Some(RebalanceEvent::Revoked(_)) => {
                        info!("分区撤销，结束会话");
                        break Ok(());
                    }
                    Some(RebalanceEvent::Assigned(next)) => {
                        info!("收到新的分区分配，结束会话");
                        inbox.pending = Some(next);
                        break Ok(());
                    }
                    Some(RebalanceEvent::Failed(e)) => break Err(GroupError::Transport(e).into()),
                    None => break Err(GroupError::Closed.into()),
                },
                msg = self.transport.next_message() => match msg {
                    Ok(msg) => route(&mut routes, msg).await,
                    Err(e) => warn!("消息错误：{e}"),
                },
                Some(joined) = claims.join_next() => {
                    record_claim(joined, &mut claim_error);
                }
            }
        };

        drop(routes);
        while let Some(joined) = claims.join_next().await {
            record_claim(joined, &mut claim_error);
        }
        let cleanup = handler.cleanup(session.as_ref());
        debug!("会话{}结束", session.epoch);

        outcome?;
        if let Some(e) = claim_error {
            return Err(GroupError::from(e).into());
        }
        cleanup.map_err(GroupError::from)?;
        Ok(())
    }
}

/// Kafka 会话
pub struct KafkaSession<T> {
    group_id: String,
    epoch: u64,
    claims: BTreeMap<String, Vec<i32>>,
    transport: Arc<T>,
}

impl<T: GroupTransport> GroupSession for KafkaSession<T> {
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
        self.transport.mark(msg);
    }
}

async fn route(routes: &mut Routes, msg: InboundMessage) {
    let key = (msg.topic.clone(), msg.partition);
    let Some(tx) = routes.get(&key) else {
        debug!("丢弃未认领分区{}|{}的消息", key.0, key.1);
        return;
    };
    if tx.send(msg).await.is_err() {
        warn!("分区{}|{}认领已结束，移除路由", key.0, key.1);
        routes.remove(&key);
    }
}

fn record_claim(
    joined: Result<Result<(), HandlerError>, tokio::task::JoinError>,
    claim_error: &mut Option<HandlerError>,
) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("{e}");
            claim_error.get_or_insert(e);
        }
        Err(e) => error!("分区认领任务异常：{e}"),
    }
}

pub(crate) fn claim_map(assigned: &[(String, i32)]) -> BTreeMap<String, Vec<i32>> {
    let mut claims: BTreeMap<String, Vec<i32>> = BTreeMap::new();
    for (topic, partition) in assigned {
        claims.entry(topic.clone()).or_default().push(*partition);
    }
    for partitions in claims.values_mut() {
        partitions.sort_unstable();
        partitions.dedup();
    }
    claims
}
