use std::{path::PathBuf, process::ExitCode};
use tracing::error;
use tracing_appender::non_blocking;
use tracing_subscriber::fmt;

#[tokio::main]
async fn main() -> ExitCode {
    let (non_blocking, _guard) = non_blocking(std::io::stdout());
    fmt()
        .with_writer(non_blocking)
        .with_target(false)
        .pretty()
        .init();

    match pulse_kafka::app::run_producer(PathBuf::from(env!("CARGO_MANIFEST_DIR"))).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("生产者启动失败：{e}");
            ExitCode::FAILURE
        }
    }
}
