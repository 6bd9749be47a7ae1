use super::*;
use tokio::sync::oneshot;

fn supervisor(
    group: MemoryGroup,
    group_id: &str,
    subscribed: &[&str],
) -> (Supervisor<MemoryGroup, GroupSessionHandler>, Arc<GroupSessionHandler>) {
    let (ready, handler) = handler(group_id);
    let supervisor = Supervisor::new(
        group_id,
        group,
        Arc::clone(&handler),
        topics(subscribed),
        ready,
    )
    .with_retry_backoff(Duration::ZERO);
    (supervisor, handler)
}

fn terminate() -> (oneshot::Sender<()>, impl Future<Output = ()>) {
    let (tx, rx) = oneshot::channel::<()>();
    (tx, async move {
        let _ = rx.await;
    })
}

#[rstest]
#[tokio::test]
async fn close_after_worker_exit(#[from(internal_setup)] _init: ()) {
    let group = MemoryGroup::new(
        "service-group-1",
        vec![Round::steady(vec![(
            "orders".to_string(),
            0,
            events("orders", 0, 0..3),
        )])],
    );
    let journal = group.journal();
    let (supervisor, handler) = supervisor(group, "service-group-1", &["orders", "payments"]);
    let (stop, signal) = terminate();
    let run = tokio::spawn(supervisor.run(signal));

    let counted = Arc::clone(&handler);
    eventually(move || counted.snapshot().count("orders", 0) == Some(3)).await;
    stop.send(()).unwrap();
    timeout(Duration::from_secs(2), run).await.unwrap().unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec![Call::Consume, Call::Return, Call::Close]
    );
}

#[rstest]
#[tokio::test]
async fn retry_after_transient_errors(#[from(internal_setup)] _init: ()) {
    let group = MemoryGroup::new(
        "service-group-2",
        vec![
            Round::Fail("Broker transport failure".to_string()),
            Round::Fail("Coordinator load in progress".to_string()),
            Round::steady(vec![(
                "payments".to_string(),
                1,
                events("payments", 1, 0..2),
            )]),
        ],
    );
    let journal = group.journal();
    let (supervisor, handler) = supervisor(group, "service-group-2", &["payments", "notifications"]);
    let (stop, signal) = terminate();
    let run = tokio::spawn(supervisor.run(signal));

    let counted = Arc::clone(&handler);
    eventually(move || counted.snapshot().count("payments", 1) == Some(2)).await;
    stop.send(()).unwrap();
    timeout(Duration::from_secs(2), run).await.unwrap().unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            Call::Consume,
            Call::Return,
            Call::Consume,
            Call::Return,
            Call::Consume,
            Call::Return,
            Call::Close
        ]
    );
}

#[rstest]
#[tokio::test]
async fn rebalance_keeps_counts(#[from(internal_setup)] _init: ()) {
    let group = MemoryGroup::new(
        "service-group-1",
        vec![
            Round::rebalance(vec![
                ("orders".to_string(), 0, events("orders", 0, 0..4)),
                ("payments".to_string(), 0, events("payments", 0, 0..1)),
            ]),
            Round::steady(vec![("orders".to_string(), 0, events("orders", 0, 4..6))]),
        ],
    );
    let journal = group.journal();
    let (supervisor, handler) = supervisor(group, "service-group-1", &["orders", "payments"]);
    let (stop, signal) = terminate();
    let run = tokio::spawn(supervisor.run(signal));

    let counted = Arc::clone(&handler);
    eventually(move || counted.snapshot().count("orders", 0) == Some(6)).await;
    stop.send(()).unwrap();
    timeout(Duration::from_secs(2), run).await.unwrap().unwrap();

    let snapshot = handler.snapshot();
    assert_eq!(snapshot.total("orders"), 6);
    assert_eq!(snapshot.count("payments", 0), Some(1));
    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            Call::Consume,
            Call::Return,
            Call::Consume,
            Call::Return,
            Call::Close
        ]
    );
}

#[rstest]
#[tokio::test]
async fn token_cancel_shuts_down(#[from(internal_setup)] _init: ()) {
    let group = MemoryGroup::new(
        "service-group-2",
        vec![Round::steady(vec![(
            "notifications".to_string(),
            0,
            Vec::new(),
        )])],
    );
    let journal = group.journal();
    let (supervisor, _handler) = supervisor(group, "service-group-2", &["notifications"]);
    let token = supervisor.shutdown_token();
    let run = tokio::spawn(supervisor.run(std::future::pending::<()>()));

    sleep(Duration::from_millis(50)).await;
    token.cancel();
    timeout(Duration::from_secs(2), run).await.unwrap().unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec![Call::Consume, Call::Return, Call::Close]
    );
}

#[rstest]
#[tokio::test]
async fn terminate_before_assignment(#[from(internal_setup)] _init: ()) {
    let group = MemoryGroup::new("service-group-1", Vec::new());
    let journal = group.journal();
    let (supervisor, handler) = supervisor(group, "service-group-1", &["orders"]);
    let (stop, signal) = terminate();
    let run = tokio::spawn(supervisor.run(signal));

    sleep(Duration::from_millis(20)).await;
    stop.send(()).unwrap();
    timeout(Duration::from_secs(2), run).await.unwrap().unwrap();

    assert!(handler.snapshot().topics.is_empty());
    assert_eq!(
        *journal.lock().unwrap(),
        vec![Call::Consume, Call::Return, Call::Close]
    );
}
