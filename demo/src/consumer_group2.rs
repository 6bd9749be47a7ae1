use std::{path::PathBuf, process::ExitCode};
use tracing::error;
use tracing_appender::non_blocking;
use tracing_subscriber::fmt;

const GROUP_ID: &str = "service-group-2";

#[tokio::main]
async fn main() -> ExitCode {
    let (non_blocking, _guard) = non_blocking(std::io::stdout());
    fmt()
        .with_writer(non_blocking)
        .with_target(false)
        .pretty()
        .init();

    let crate_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    match pulse_kafka::app::run_consumer(GROUP_ID, crate_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{GROUP_ID} 启动失败：{e}");
            ExitCode::FAILURE
        }
    }
}
