//! 应用入口：加载配置、装配客户端并运行直至收到终止信号。

use crate::{errors::AppError, group::KafkaGroup, producer::KafkaProducer};
use pulse::{
    EventFactory, GroupSessionHandler, Pipeline, Readiness, Supervisor, config::load_settings,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{Span, field, info, instrument};

/// 运行指定消费组，收到终止信号后输出最终计数
#[instrument(name = "consumer_app", skip(crate_dir), fields(topics))]
pub async fn run_consumer(group_id: &str, crate_dir: PathBuf) -> Result<(), AppError> {
    let settings = load_settings(crate_dir)?;
    let cfg = settings.group(group_id)?;
    Span::current().record("topics", field::debug(&cfg.topics));

    let group = KafkaGroup::new(&settings.bootstrap, group_id, &cfg)?;
    let readiness = Arc::new(Readiness::new());
    let handler = Arc::new(
        GroupSessionHandler::new(group_id, Arc::clone(&readiness))
            .with_decode_policy(cfg.decode_failure),
    );
    let supervisor = Supervisor::new(
        group_id,
        group,
        Arc::clone(&handler),
        cfg.topics.clone(),
        readiness,
    )
    .with_retry_backoff(cfg.retry_backoff());

    supervisor.run(crate::shutdown_signal()).await;
    info!("{group_id} 最终计数：\n{}", handler.snapshot());
    Ok(())
}

/// 运行生产者，直至收到中断信号
#[instrument(name = "producer_app", skip_all)]
pub async fn run_producer(crate_dir: PathBuf) -> Result<(), AppError> {
    let settings = load_settings(crate_dir)?;
    let channels = KafkaProducer::new(&settings.bootstrap, &settings.producer)?.launch();
    let events = EventFactory::new(
        settings.topics.clone(),
        settings.producer.event_types.clone(),
    );
    let report = Pipeline::new(channels, &settings.producer)
        .run(events, crate::interrupt_signal())
        .await;
    info!(
        "生产者退出：接受{}条，成功{}条，失败{}条",
        report.sent, report.delivered, report.failed
    );
    Ok(())
}
