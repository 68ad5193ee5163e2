//! Integration tests for the crawl scheduler: cycle semantics, overlap
//! prevention, dispatch ordering, and the on-demand check path.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{post, storage, test_config, FakeSource, RecordingSink};
use feed_watcher::storage::Storage;
use server_core::kernel::{CheckError, Scheduler};

#[tokio::test]
async fn first_cycle_establishes_baseline_and_notifies_once() {
    let storage = storage().await;
    storage.set_route("guild-1", "https://hook/one").await.unwrap();

    let source = Arc::new(FakeSource::new(vec![post("300"), post("200"), post("100")]));
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(storage.clone(), source, sink.clone(), test_config());

    scheduler.run_cycle("test").await;

    // The whole backlog is remembered but only the newest post goes out.
    assert_eq!(sink.delivered_ids(), vec!["300"]);
    assert_eq!(storage.count_posts().await.unwrap(), 3);
    assert!(!scheduler.is_crawl_in_flight());
}

#[tokio::test]
async fn steady_state_dispatches_oldest_new_first() {
    let storage = storage().await;
    storage.set_route("guild-1", "https://hook/one").await.unwrap();

    let source = Arc::new(FakeSource::new(vec![post("100")]));
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(storage.clone(), source.clone(), sink.clone(), test_config());

    // Baseline cycle delivers the then-newest post.
    scheduler.run_cycle("test").await;

    // Two new posts appear above the old head; they must be delivered in
    // publication order, not listing order.
    source
        .set_listing(vec![post("300"), post("200"), post("100")])
        .await;
    scheduler.run_cycle("test").await;

    assert_eq!(sink.delivered_ids(), vec!["100", "200", "300"]);
}

#[tokio::test]
async fn repeated_cycles_never_renotify_seen_posts() {
    let storage = storage().await;
    storage.set_route("guild-1", "https://hook/one").await.unwrap();

    let source = Arc::new(FakeSource::new(vec![post("200"), post("100")]));
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(storage.clone(), source, sink.clone(), test_config());

    scheduler.run_cycle("test").await;
    scheduler.run_cycle("test").await;
    scheduler.run_cycle("test").await;

    assert_eq!(sink.delivered_ids(), vec!["200"]);
}

#[tokio::test]
async fn empty_listing_cycle_mutates_nothing() {
    let storage = storage().await;
    storage.set_route("guild-1", "https://hook/one").await.unwrap();

    let source = Arc::new(FakeSource::new(Vec::new()));
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(storage.clone(), source, sink.clone(), test_config());

    scheduler.run_cycle("test").await;

    assert!(sink.delivered_ids().is_empty());
    assert_eq!(storage.count_posts().await.unwrap(), 0);
    assert!(storage.last_head_id().await.unwrap().is_none());
}

#[tokio::test]
async fn overlapping_cycles_are_skipped_not_queued() {
    let storage = storage().await;
    let source = Arc::new(FakeSource::slow(
        vec![post("1")],
        Duration::from_millis(200),
    ));
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(storage, source.clone(), sink, test_config());

    tokio::join!(scheduler.run_cycle("first"), scheduler.run_cycle("second"));

    // The second tick found the in-flight flag held and never reached the
    // renderer.
    assert_eq!(source.call_count(), 1);
    assert!(!scheduler.is_crawl_in_flight());
}

#[tokio::test]
async fn one_failing_route_does_not_block_the_others() {
    let storage = storage().await;
    storage.set_route("guild-1", "https://hook/bad").await.unwrap();
    storage.set_route("guild-2", "https://hook/good").await.unwrap();

    let source = Arc::new(FakeSource::new(vec![post("100")]));
    let sink = Arc::new(RecordingSink::failing_for("https://hook/bad"));
    let scheduler = Scheduler::new(storage.clone(), source, sink.clone(), test_config());

    scheduler.run_cycle("test").await;

    let deliveries = sink.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].1, "https://hook/good");
    // The cycle itself still committed its state.
    assert_eq!(storage.count_posts().await.unwrap(), 1);
}

#[tokio::test]
async fn on_demand_check_returns_latest_post_without_notifying() {
    let storage = storage().await;
    storage.set_route("guild-1", "https://hook/one").await.unwrap();

    let source = Arc::new(FakeSource::new(vec![post("300"), post("200")]));
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(storage.clone(), source, sink.clone(), test_config());

    let posts = scheduler.request_immediate_check("10.0.0.1").await.unwrap();

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id.as_str(), "300");
    assert_eq!(storage.count_posts().await.unwrap(), 1);
    assert!(sink.delivered_ids().is_empty());
}

#[tokio::test]
async fn on_demand_check_enforces_per_caller_cooldown() {
    let storage = storage().await;
    let source = Arc::new(FakeSource::new(vec![post("100")]));
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(storage, source, sink, test_config());

    assert!(scheduler.request_immediate_check("10.0.0.1").await.is_ok());

    let second = scheduler.request_immediate_check("10.0.0.1").await;
    assert!(matches!(second, Err(CheckError::CooldownActive { .. })));

    // A different caller has its own window.
    assert!(scheduler.request_immediate_check("10.0.0.2").await.is_ok());
}

#[tokio::test]
async fn on_demand_check_times_out_without_blocking_the_caller() {
    let storage = storage().await;
    // Far slower than the 200ms test deadline.
    let source = Arc::new(FakeSource::slow(vec![post("1")], Duration::from_secs(30)));
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(storage, source, sink, test_config());

    let started = std::time::Instant::now();
    let result = scheduler.request_immediate_check("10.0.0.1").await;

    assert!(matches!(result, Err(CheckError::Timeout(_))));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn on_demand_check_reports_busy_while_a_cycle_runs() {
    let storage = storage().await;
    let source = Arc::new(FakeSource::slow(
        vec![post("1")],
        Duration::from_millis(300),
    ));
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(storage, source, sink, test_config());

    let background = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_cycle("scheduled").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = scheduler.request_immediate_check("10.0.0.1").await;
    assert!(matches!(result, Err(CheckError::Busy)));

    background.await.unwrap();
}

#[tokio::test]
async fn cleanup_is_idempotent_and_safe_without_start() {
    let storage = storage().await;
    let source = Arc::new(FakeSource::new(Vec::new()));
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(storage, source, sink, test_config());

    // Never started: cleanup must still be safe, twice.
    scheduler.cleanup().await;
    scheduler.cleanup().await;
}
