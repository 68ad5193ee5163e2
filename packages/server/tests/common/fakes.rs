//! Test doubles for the renderer and notification boundaries, plus fixture
//! helpers shared by the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use feed_watcher::renderer::ListingSource;
use feed_watcher::storage::SqliteStorage;
use feed_watcher::types::{Post, PostId};
use server_core::kernel::{NotificationSink, SchedulerConfig};
use tokio::sync::Mutex;

/// Listing source backed by a fixed candidate list, with an optional
/// per-call delay to simulate a slow or wedged renderer.
pub struct FakeSource {
    listing: Mutex<Vec<Post>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(listing: Vec<Post>) -> Self {
        Self {
            listing: Mutex::new(listing),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(listing: Vec<Post>, delay: Duration) -> Self {
        Self {
            listing: Mutex::new(listing),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replace what the next extraction will see.
    pub async fn set_listing(&self, listing: Vec<Post>) {
        *self.listing.lock().await = listing;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for FakeSource {
    async fn extract_listing(&self) -> Vec<Post> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.listing.lock().await.clone()
    }

    async fn close(&self) {}
}

/// Sink that records deliveries instead of talking to Discord. Deliveries
/// to `failing_target` (if set) error, to exercise per-destination failure
/// isolation.
pub struct RecordingSink {
    delivered: std::sync::Mutex<Vec<(String, String)>>,
    failing_target: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            delivered: std::sync::Mutex::new(Vec::new()),
            failing_target: None,
        }
    }

    pub fn failing_for(target: &str) -> Self {
        Self {
            delivered: std::sync::Mutex::new(Vec::new()),
            failing_target: Some(target.to_string()),
        }
    }

    /// Post ids in delivery order, across all destinations.
    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// (post id, webhook) pairs in delivery order.
    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, post: &Post, webhook_url: &str) -> anyhow::Result<()> {
        if self.failing_target.as_deref() == Some(webhook_url) {
            return Err(anyhow!("simulated webhook failure"));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((post.id.0.clone(), webhook_url.to_string()));
        Ok(())
    }
}

pub fn post(id: &str) -> Post {
    Post::new(
        PostId::new(id),
        format!("post {id}"),
        format!("https://fanding.kr/@stellive/section/3498/post/{id}/"),
        None,
        Some("1시간 전".to_string()),
    )
}

pub async fn storage() -> Arc<SqliteStorage> {
    let storage = SqliteStorage::in_memory().await.expect("open in-memory db");
    storage.migrate().await.expect("run migrations");
    Arc::new(storage)
}

/// Scheduler config tightened for tests: negligible dispatch gap and a
/// short on-demand deadline.
pub fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        dispatch_gap: Duration::from_millis(1),
        boot_delay: Duration::from_millis(1),
        check_cooldown: Duration::from_secs(60),
        check_timeout: Duration::from_millis(200),
        ..SchedulerConfig::default()
    }
}
