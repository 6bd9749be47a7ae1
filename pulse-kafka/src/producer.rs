//! # Kafka 异步生产者
//!
//! 派发任务从输入通道取记录并发投递，结果分别写入成功与失败通道。输入通道关闭后
//! 等待在途投递完成，再关闭两个结果通道。

use crate::config::producer_config;
use pulse::{
    ProducerChannels,
    config::ProducerConfig,
    producer::{Delivered, DeliveryFailure, OutboundRecord},
};
use rdkafka::{
    error::KafkaError,
    producer::{FutureProducer, FutureRecord, future_producer::Delivery},
};
use tokio::{sync::mpsc, task::JoinSet, time::Duration};
use tracing::{debug, error, info, instrument};

/// Kafka 异步生产者
pub struct KafkaProducer {
    producer: FutureProducer,
    timeout: Duration,
    input_buffer: usize,
}

impl KafkaProducer {
    /// 创建生产者客户端
    pub fn new(bootstrap: &str, cfg: &ProducerConfig) -> Result<Self, KafkaError> {
        let producer: FutureProducer = producer_config(bootstrap, cfg).create()?;
        info!("成功创建生产者客户端");
        Ok(Self {
            producer,
            timeout: cfg.timeout(),
            input_buffer: cfg.input_buffer.max(1),
        })
    }

    /// 启动派发任务，返回生产者通道
    pub fn launch(self) -> ProducerChannels {
        let (input, rx) = mpsc::channel(self.input_buffer);
        let (ok_tx, successes) = mpsc::unbounded_channel();
        let (err_tx, errors) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(self.producer, self.timeout, rx, ok_tx, err_tx));
        ProducerChannels {
            input,
            successes,
            errors,
        }
    }
}

#[instrument(name = "producer_dispatch", skip_all)]
async fn dispatch(
    producer: FutureProducer,
    timeout: Duration,
    mut input: mpsc::Receiver<OutboundRecord>,
    successes: mpsc::UnboundedSender<Delivered>,
    errors: mpsc::UnboundedSender<DeliveryFailure>,
) {
    let mut inflight = JoinSet::new();
    loop {
        tokio::select! {
            record = input.recv() => match record {
                Some(record) => {
                    inflight.spawn(deliver(producer.clone(), record, timeout));
                }
                None => break,
            },
            Some(joined) = inflight.join_next() => report(joined, &successes, &errors),
        }
    }

    debug!("输入通道已关闭，等待{}条在途投递", inflight.len());
    while let Some(joined) = inflight.join_next().await {
        report(joined, &successes, &errors);
    }
    info!("在途投递已完成，关闭结果通道");
}

async fn deliver(
    producer: FutureProducer,
    record: OutboundRecord,
    timeout: Duration,
) -> Result<Delivered, DeliveryFailure> {
    let sent = producer
        .send(
            FutureRecord::to(&record.topic)
                .key(&record.key)
                .payload(&record.payload),
            timeout,
        )
        .await;
    match sent {
        Ok(Delivery {
            partition,
            offset,
            timestamp: _timestamp,
        }) => Ok(Delivered {
            topic: record.topic,
            partition,
            offset,
            key: record.key,
        }),
        Err((e, _)) => Err(DeliveryFailure {
            record,
            error: e.to_string(),
        }),
    }
}

fn report(
    joined: Result<Result<Delivered, DeliveryFailure>, tokio::task::JoinError>,
    successes: &mpsc::UnboundedSender<Delivered>,
    errors: &mpsc::UnboundedSender<DeliveryFailure>,
) {
    let sent = match joined {
        Ok(Ok(delivered)) => successes.send(delivered).is_ok(),
        Ok(Err(failure)) => errors.send(failure).is_ok(),
        Err(e) => {
            error!("投递任务异常：{e}");
            true
        }
    };
    if !sent {
        debug!("结果通道已无人接收");
    }
}
