//! # 消费组监管者
//!
//! 持有取消令牌与就绪通知，驱动唯一的消费循环，并按固定顺序关闭：取消令牌、
//! 等待消费循环退出、释放消费组客户端。

use crate::{
    group::{ConsumerGroup, GroupHandler},
    readiness::Readiness,
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// 消费组监管者
pub struct Supervisor<G, H> {
    group_id: String,
    group: Arc<G>,
    handler: Arc<H>,
    topics: Vec<String>,
    readiness: Arc<Readiness>,
    token: CancellationToken,
    retry_backoff: Duration,
}

impl<G, H> Supervisor<G, H>
where
    G: ConsumerGroup,
    H: GroupHandler,
{
    /// 构造监管者
    ///
    /// `readiness` 须与回调共享同一实例。
    pub fn new(
        group_id: impl Into<String>,
        group: G,
        handler: Arc<H>,
        topics: Vec<String>,
        readiness: Arc<Readiness>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            group: Arc::new(group),
            handler,
            topics,
            readiness,
            token: CancellationToken::new(),
            retry_backoff: Duration::from_secs(1),
        }
    }

    /// 设置消费调用出错后的重试间隔
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// 取消令牌，取消即触发关闭
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 运行直至 `terminate` 完成或令牌被取消
    #[instrument(name = "supervise_group", skip_all, fields(group_id = %self.group_id))]
    pub async fn run<F>(self, terminate: F)
    where
        F: Future<Output = ()>,
    {
        let ready = self.readiness.wait();
        let worker = tokio::spawn(consume_loop(
            Arc::clone(&self.group),
            Arc::clone(&self.handler),
            self.topics.clone(),
            Arc::clone(&self.readiness),
            self.token.clone(),
            self.retry_backoff,
        ));

        tokio::pin!(terminate);
        let started = tokio::select! {
            _ = ready => {
                info!("{} 就绪", self.group_id);
                true
            }
            _ = &mut terminate => {
                info!("启动期间收到终止信号");
                false
            }
            _ = self.token.cancelled() => {
                info!("启动期间上下文已取消");
                false
            }
        };

        if started {
            tokio::select! {
                _ = &mut terminate => info!("收到终止信号"),
                _ = self.token.cancelled() => info!("上下文已取消"),
            }
        }

        self.token.cancel();
        if let Err(e) = worker.await {
            error!("消费循环异常退出：{e}");
        }
        info!("消费循环已退出，关闭消费组客户端");
        if let Err(e) = self.group.close() {
            error!("关闭消费组客户端失败：{e}");
        }
    }
}

async fn consume_loop<G, H>(
    group: Arc<G>,
    handler: Arc<H>,
    topics: Vec<String>,
    readiness: Arc<Readiness>,
    token: CancellationToken,
    retry_backoff: Duration,
) where
    G: ConsumerGroup,
    H: GroupHandler,
{
    loop {
        let failed = match group.consume(&token, &topics, Arc::clone(&handler)).await {
            Ok(()) => false,
            Err(e) => {
                warn!("消费错误：{e}");
                true
            }
        };

        if token.is_cancelled() {
            info!("上下文已取消，退出消费循环");
            return;
        }

        if readiness.is_ready() {
            readiness.reset();
        }
        if failed && !retry_backoff.is_zero() {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("退避期间上下文已取消，退出消费循环");
                    return;
                }
                _ = tokio::time::sleep(retry_backoff) => {}
            }
        }
    }
}
