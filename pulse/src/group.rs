//! # 消费组契约
//!
//! 消费组实现负责会话的建立与结束：每个会话先调用一次 [`GroupHandler::setup`]，
//! 再为每个认领的分区并发调用 [`GroupHandler::consume_claim`]，全部分区结束后
//! 调用一次 [`GroupHandler::cleanup`]。

use crate::errors::HandlerError;
use futures::Stream;
use std::{
    collections::BTreeMap,
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 收到的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// 主题
    pub topic: String,
    /// 分区
    pub partition: i32,
    /// 偏移量
    pub offset: i64,
    /// 消息键
    pub key: Option<Vec<u8>>,
    /// 消息体
    pub payload: Option<Vec<u8>>,
}

/// 会话
pub trait GroupSession: Send + Sync {
    /// 消费组 Id
    fn group_id(&self) -> &str;

    /// 会话纪元，每次分配递增
    fn epoch(&self) -> u64;

    /// 本会话认领的主题分区
    fn claims(&self) -> &BTreeMap<String, Vec<i32>>;

    /// 标记消息已处理，其偏移量可被提交
    fn mark_message(&self, msg: &InboundMessage);
}

/// 分区认领
///
/// 消息流随会话结束或分区撤销而终止，终止并非错误。
pub struct Claim {
    topic: String,
    partition: i32,
    messages: mpsc::Receiver<InboundMessage>,
}

impl Claim {
    /// 构造分区认领
    pub fn new(topic: impl Into<String>, partition: i32, messages: mpsc::Receiver<InboundMessage>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            messages,
        }
    }

    /// 主题
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 分区
    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl Stream for Claim {
    type Item = InboundMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().messages.poll_recv(cx)
    }
}

/// 会话回调
pub trait GroupHandler: Send + Sync + 'static {
    /// 会话建立，分区已分配
    fn setup(&self, session: &dyn GroupSession) -> Result<(), HandlerError>;

    /// 消费一个分区认领，直至消息流终止
    fn consume_claim(
        &self,
        session: &dyn GroupSession,
        claim: Claim,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send;

    /// 会话结束，所有分区认领均已返回
    fn cleanup(&self, session: &dyn GroupSession) -> Result<(), HandlerError>;
}

/// 消费组客户端
pub trait ConsumerGroup: Send + Sync + 'static {
    /// 错误类型
    type Error: Display + Send;

    /// 以指定回调完成一个会话
    ///
    /// 会话因再平衡结束或 `shutdown` 被取消时返回。
    fn consume<H: GroupHandler>(
        &self,
        shutdown: &CancellationToken,
        topics: &[String],
        handler: Arc<H>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// 释放客户端
    fn close(&self) -> Result<(), Self::Error>;
}
