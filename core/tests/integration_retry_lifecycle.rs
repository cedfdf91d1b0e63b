use std::sync::Arc;

use async_trait::async_trait;
use bridgeportal_core::{
    DraftManager, ManualClock, MemoryStorage, NewRetryItem, RetryHandler, RetryItem, RetryKind,
    StoreConfig, TokioTimerDriver,
};
use mockall::mock;
use serde_json::json;

mock! {
    pub Handler {}

    #[async_trait]
    impl RetryHandler for Handler {
        async fn retry(&self, item: &RetryItem) -> anyhow::Result<()>;
    }
}

fn setup(clock: ManualClock) -> DraftManager {
    DraftManager::with_config(
        Arc::new(MemoryStorage::new()),
        Arc::new(TokioTimerDriver::current().unwrap()),
        Arc::new(clock),
        StoreConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_contact_retry_scenario() {
    // Failed contact update for c9; first retry fails at t0
    let t0 = 1_700_000_000_000;
    let clock = ManualClock::new(t0);
    let manager = setup(clock.clone());

    let id = manager
        .add_to_retry_queue(NewRetryItem::contact(
            "acc-1",
            "c9",
            json!({"email": "new@acme.example"}),
        ))
        .unwrap();

    let queue = manager.get_retry_queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].retry_count, 0);
    assert_eq!(queue[0].kind, RetryKind::Contact);

    manager.mark_retry_attempt(&id, false);
    let item = &manager.get_retry_queue()[0];
    assert_eq!(item.retry_count, 1);
    assert_eq!(item.last_attempt, t0);

    clock.set(t0 + 500);
    assert!(manager.get_retryable_items().is_empty());

    clock.set(t0 + 1_000);
    let due = manager.get_retryable_items();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, id);
}

#[tokio::test]
async fn test_three_failures_exhaust_item() {
    let clock = ManualClock::new(1_000_000);
    let manager = setup(clock.clone());
    let id = manager
        .add_to_retry_queue(NewRetryItem::company("acc-1", json!({"vat": "100"})))
        .unwrap();

    for _ in 0..3 {
        manager.mark_retry_attempt(&id, false);
        clock.advance(60_000);
    }

    clock.advance(24 * 60 * 60 * 1000);
    assert!(manager.get_retryable_items().is_empty());
    assert_eq!(manager.exhausted_retry_items().len(), 1);
    assert_eq!(manager.get_retry_queue().len(), 1);

    // Caller decides the final disposition
    manager.remove_from_retry_queue(&id);
    assert!(manager.get_retry_queue().is_empty());
}

#[tokio::test]
async fn test_success_removes_item() {
    let manager = setup(ManualClock::new(1_000_000));
    let id = manager
        .add_to_retry_queue(NewRetryItem::company("acc-1", json!({})))
        .unwrap();

    manager.mark_retry_attempt(&id, true);
    assert!(manager.get_retry_queue().is_empty());
}

#[tokio::test]
async fn test_process_retries_marks_outcomes() {
    let clock = ManualClock::new(1_000_000);
    let manager = setup(clock.clone());

    manager.add_to_retry_queue(NewRetryItem::company("acc-1", json!({"englishName": "Acme"})));
    manager.add_to_retry_queue(NewRetryItem::contact("acc-1", "c9", json!({"phone": "1"})));

    let mut handler = MockHandler::new();
    handler
        .expect_retry()
        .withf(|item| item.kind == RetryKind::Company)
        .times(1)
        .returning(|_| Ok(()));
    handler
        .expect_retry()
        .withf(|item| item.kind == RetryKind::Contact)
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("BridgeAPI returned 503")));

    let report = manager.process_retries(&handler).await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.exhausted, 0);

    let queue = manager.get_retry_queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].contact_id.as_deref(), Some("c9"));
    assert_eq!(queue[0].retry_count, 1);
}

#[tokio::test]
async fn test_process_retries_respects_backoff_and_ceiling() {
    let clock = ManualClock::new(1_000_000);
    let manager = setup(clock.clone());
    manager.add_to_retry_queue(NewRetryItem::contact("acc-1", "c9", json!({})));

    let mut handler = MockHandler::new();
    handler
        .expect_retry()
        .times(3)
        .returning(|_| Err(anyhow::anyhow!("timeout")));

    // Attempt 1 immediately
    assert_eq!(manager.process_retries(&handler).await.attempted, 1);
    // Still backing off
    clock.advance(999);
    assert_eq!(manager.process_retries(&handler).await.attempted, 0);
    // Attempt 2 after 1s
    clock.advance(1);
    assert_eq!(manager.process_retries(&handler).await.attempted, 1);
    // Attempt 3 after 5s
    clock.advance(5_000);
    let report = manager.process_retries(&handler).await;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.exhausted, 1);

    // Out of budget
    clock.advance(60 * 60 * 1000);
    assert_eq!(manager.process_retries(&handler).await.attempted, 0);
}
