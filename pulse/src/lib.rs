//! # **pulse** 核心库
//!
//! 分区事件日志的消费组会话计数与异步生产管道，传输层由具体实现提供。

#![warn(missing_docs)]

pub mod config;
pub mod errors;
pub mod event;
pub mod group;
pub mod handler;
pub mod producer;
pub mod readiness;
pub mod stats;
pub mod supervisor;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use event::Event;
pub use group::{Claim, ConsumerGroup, GroupHandler, GroupSession, InboundMessage};
pub use handler::GroupSessionHandler;
pub use producer::{EventFactory, Pipeline, PipelineReport, ProducerChannels};
pub use readiness::Readiness;
pub use stats::{StatsSnapshot, StatsTable};
pub use supervisor::Supervisor;
