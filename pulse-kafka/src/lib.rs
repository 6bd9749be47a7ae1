//! # **pulse** 的 Kafka 实现
//!
//! 基于 rdkafka 的消费组客户端与异步生产者。

pub(crate) mod context;

pub mod app;
pub mod config;
pub mod errors;
pub mod group;
pub mod producer;
pub mod session;


pub use group::KafkaGroup;
pub use producer::KafkaProducer;
pub use session::{GroupTransport, KafkaSession};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 等待 Ctrl-C 或 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("收到 Ctrl-C 信号"),
            Err(e) => {
                error!("监听 Ctrl-C 信号失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
                info!("收到 SIGTERM 信号");
            }
            Err(e) => {
                error!("监听 SIGTERM 信号失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// 收到 Ctrl-C 即取消的令牌
pub fn interrupt_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("收到 Ctrl-C 信号"),
            Err(e) => {
                error!("监听 Ctrl-C 信号失败: {e}");
                return;
            }
        }
        interrupt.cancel();
    });
    token
}
