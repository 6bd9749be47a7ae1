use super::*;
use crate::config::ProducerConfig;
use tokio::sync::Notify;

fn pipeline(channels: ProducerChannels) -> Pipeline {
    Pipeline::new(channels, &ProducerConfig::default()).with_pause(Duration::ZERO, Duration::ZERO)
}

fn outbound(topic: &str, n: usize) -> Vec<(String, Event)> {
    (0..n)
        .map(|i| {
            (
                topic.to_string(),
                Event::new(format!("{topic}_event"), format!("evt-{topic}-{i}"), format!("data-{i}")),
            )
        })
        .collect()
}

#[rstest]
#[tokio::test]
async fn drain_all_acknowledgments(#[from(internal_setup)] _init: ()) {
    let channels = MemoryProducer::new(8).launch();
    let report = timeout(
        Duration::from_secs(2),
        pipeline(channels).run(outbound("orders", 5), CancellationToken::new()),
    )
    .await
    .unwrap();

    assert_eq!(
        report,
        PipelineReport {
            sent: 5,
            delivered: 5,
            failed: 0
        }
    );
}

#[rstest]
#[tokio::test]
async fn failed_deliveries_are_drained(#[from(internal_setup)] _init: ()) {
    let channels = MemoryProducer::new(8).failing("payments").launch();
    let mut events = outbound("orders", 2);
    events.extend(outbound("payments", 3));
    let report = timeout(
        Duration::from_secs(2),
        pipeline(channels).run(events, CancellationToken::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.sent, 5);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 3);
}

#[rstest]
#[tokio::test]
async fn interrupt_while_input_is_full(#[from(internal_setup)] _init: ()) {
    let gate = Arc::new(Notify::new());
    let channels = MemoryProducer::new(1).stalled(Arc::clone(&gate)).launch();
    let factory = EventFactory::new(
        topics(&["orders", "payments", "notifications"]),
        ProducerConfig::default().event_types,
    );
    let interrupt = CancellationToken::new();
    let run = tokio::spawn(pipeline(channels).run(factory, interrupt.clone()));

    sleep(Duration::from_millis(50)).await;
    interrupt.cancel();
    gate.notify_one();
    let report = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();

    assert_eq!(
        report,
        PipelineReport {
            sent: 1,
            delivered: 1,
            failed: 0
        }
    );
}

#[rstest]
#[tokio::test]
async fn interrupt_before_first_send(#[from(internal_setup)] _init: ()) {
    let channels = MemoryProducer::new(4).launch();
    let interrupt = CancellationToken::new();
    interrupt.cancel();
    let report = timeout(
        Duration::from_secs(2),
        pipeline(channels).run(outbound("notifications", 3), interrupt),
    )
    .await
    .unwrap();

    assert_eq!(report, PipelineReport::default());
}

#[rstest]
#[tokio::test]
async fn paced_sends_observe_interrupt(#[from(internal_setup)] _init: ()) {
    let channels = MemoryProducer::new(4).launch();
    let interrupt = CancellationToken::new();
    let paced = Pipeline::new(channels, &ProducerConfig::default())
        .with_pause(Duration::from_secs(30), Duration::from_secs(30));
    let run = tokio::spawn(paced.run(outbound("orders", 10), interrupt.clone()));

    sleep(Duration::from_millis(50)).await;
    interrupt.cancel();
    let report = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();

    assert_eq!(report.sent, 1);
    assert_eq!(report.delivered, 1);
}

#[test]
fn event_factory_follows_topic_types() {
    let cfg = ProducerConfig::default();
    let factory = EventFactory::new(
        topics(&["orders", "payments", "notifications"]),
        cfg.event_types.clone(),
    );
    for (topic, event) in factory.take(200) {
        assert!(cfg.event_types[&topic].contains(&event.kind));
        assert!(event.id.starts_with("evt-"));
        let n: u32 = event.data.strip_prefix("data-").unwrap().parse().unwrap();
        assert!(n < 1000);
    }
}

#[test]
fn event_factory_without_topics_is_empty() {
    let mut factory = EventFactory::new(Vec::new(), Default::default());
    assert!(factory.next().is_none());
}
