#![allow(dead_code)]

use pulse::{
    Event, GroupSessionHandler, Readiness,
    config::{Settings, load_settings},
    producer::OutboundRecord,
};
use rdkafka::{
    ClientConfig,
    admin::{AdminClient, AdminOptions, NewTopic, TopicReplication},
    client::DefaultClientContext,
};
use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::time::{Duration, sleep, timeout};
use tracing::{Level, info};
use tracing_subscriber::fmt;

pub(crate) static SETTINGS: LazyLock<Settings> = LazyLock::new(|| {
    fmt().with_test_writer().with_max_level(Level::DEBUG).init();
    info!("启用 {} 测试日志输出", Level::DEBUG);
    load_settings(PathBuf::from(env!("CARGO_MANIFEST_DIR"))).unwrap()
});

pub(crate) static OPTS: LazyLock<AdminOptions> = LazyLock::new(|| {
    AdminOptions::new()
        .operation_timeout(Some(Duration::from_secs(30)))
        .request_timeout(Some(Duration::from_secs(45)))
});

pub(crate) static ADMIN: LazyLock<AdminClient<DefaultClientContext>> = LazyLock::new(|| {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", &SETTINGS.bootstrap);
    config.create().expect("管理客户端创建失败")
});

pub(crate) fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

pub(crate) async fn create_topic(name: &str, partitions: i32) {
    let topic = NewTopic::new(name, partitions, TopicReplication::Fixed(1));
    ADMIN.create_topics(&[topic], &OPTS).await.unwrap();
}

pub(crate) fn handler(group_id: &str) -> (Arc<Readiness>, Arc<GroupSessionHandler>) {
    let ready = Arc::new(Readiness::new());
    let handler = Arc::new(GroupSessionHandler::new(group_id, Arc::clone(&ready)));
    (ready, handler)
}

pub(crate) fn outbound(topic: &str, n: usize) -> Vec<(String, Event)> {
    (0..n)
        .map(|i| {
            (
                topic.to_string(),
                Event::new("payment_received", format!("evt-{i}"), format!("data-{i}")),
            )
        })
        .collect()
}

pub(crate) fn raw(topic: &str, key: &str, payload: &[u8]) -> OutboundRecord {
    OutboundRecord {
        topic: topic.to_string(),
        key: key.to_string(),
        payload: payload.to_vec(),
    }
}

pub(crate) async fn eventually(check: impl Fn() -> bool) {
    timeout(Duration::from_secs(60), async {
        while !check() {
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("条件未在超时前满足");
}
