//! Crawl scheduling and orchestration using tokio-cron-scheduler.
//!
//! Drives renderer -> change detector -> notification dispatch on a
//! time-of-day cadence: short intervals during active hours, hourly
//! overnight. A single in-flight flag serializes cycles; a tick that lands
//! while a cycle is still running is skipped outright, never queued, so a
//! slow renderer cannot pile work up. One cycle also runs at process start
//! to catch posts published while the watcher was down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use feed_watcher::detector;
use feed_watcher::renderer::ListingSource;
use feed_watcher::storage::Storage;
use feed_watcher::types::Post;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::kernel::discord::NotificationSink;

/// How many posts an on-demand check loads and returns.
const LATEST_COUNT: usize = 1;

/// Scheduler tunables, loaded from the environment by the server config.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cron expression (with seconds) for the active window.
    pub active_cron: String,
    /// Cron expression for the quiet window.
    pub quiet_cron: String,
    /// Pause between consecutive notifications in one cycle, to keep
    /// delivery order stable and stay under sink rate limits.
    pub dispatch_gap: Duration,
    /// Renderer settle time before the boot cycle.
    pub boot_delay: Duration,
    /// Per-caller cooldown for on-demand checks.
    pub check_cooldown: Duration,
    /// Wall-clock budget for one on-demand check.
    pub check_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            // Every 5 minutes between 09:00 and 23:59.
            active_cron: "0 */5 9-23 * * *".to_string(),
            // On the hour between 00:00 and 08:00.
            quiet_cron: "0 0 0-8 * * *".to_string(),
            dispatch_gap: Duration::from_millis(100),
            boot_delay: Duration::from_secs(3),
            check_cooldown: Duration::from_secs(60),
            check_timeout: Duration::from_secs(60),
        }
    }
}

/// Why an on-demand check produced no posts for the caller.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("a crawl is already in flight, try again shortly")]
    Busy,

    #[error("cooldown active, retry in {remaining_secs}s")]
    CooldownActive { remaining_secs: u64 },

    #[error("check timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

pub struct Scheduler {
    storage: Arc<dyn Storage>,
    source: Arc<dyn ListingSource>,
    sink: Arc<dyn NotificationSink>,
    config: SchedulerConfig,
    in_flight: Arc<AtomicBool>,
    cooldowns: Mutex<HashMap<String, Instant>>,
    cron: Mutex<Option<JobScheduler>>,
}

impl Scheduler {
    pub fn new(
        storage: Arc<dyn Storage>,
        source: Arc<dyn ListingSource>,
        sink: Arc<dyn NotificationSink>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            storage,
            source,
            sink,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
            cooldowns: Mutex::new(HashMap::new()),
            cron: Mutex::new(None),
        })
    }

    /// Register the cron windows and kick off the boot cycle.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let scheduler = JobScheduler::new().await?;

        let active = self.clone();
        let active_job = Job::new_async(self.config.active_cron.as_str(), move |_uuid, _lock| {
            let scheduler = active.clone();
            Box::pin(async move {
                scheduler.run_cycle("active window").await;
            })
        })?;
        scheduler.add(active_job).await?;

        let quiet = self.clone();
        let quiet_job = Job::new_async(self.config.quiet_cron.as_str(), move |_uuid, _lock| {
            let scheduler = quiet.clone();
            Box::pin(async move {
                scheduler.run_cycle("quiet window").await;
            })
        })?;
        scheduler.add(quiet_job).await?;

        scheduler.start().await?;
        *self.cron.lock().await = Some(scheduler);

        info!(
            active = %self.config.active_cron,
            quiet = %self.config.quiet_cron,
            "Crawl schedule registered"
        );

        // Catch anything published while the process was down without
        // waiting for the first tick. The renderer gets a moment to finish
        // its own startup first.
        let boot = self.clone();
        let delay = self.config.boot_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            boot.run_cycle("startup").await;
        });

        Ok(())
    }

    /// Run one crawl cycle unless one is already in flight.
    ///
    /// Any failure is logged and treated as zero new posts; errors never
    /// escape into the scheduler loop or skip later ticks.
    pub async fn run_cycle(&self, label: &str) {
        let Some(_guard) = self.try_begin() else {
            info!(label, "Previous crawl still running, skipping this tick");
            return;
        };

        info!(label, "Crawl cycle started");
        match self.crawl_and_dispatch().await {
            Ok(0) => info!(label, "Crawl cycle finished, nothing new"),
            Ok(count) => info!(label, new_posts = count, "Crawl cycle finished"),
            Err(e) => error!(label, error = ?e, "Crawl cycle failed"),
        }
    }

    async fn crawl_and_dispatch(&self) -> Result<usize> {
        let candidates = self.source.extract_listing().await;

        // detect persists before returning, so a store failure here means
        // nothing gets dispatched: never notify about posts the store does
        // not durably know.
        let new_posts = detector::detect(&candidates, self.storage.as_ref()).await?;
        if new_posts.is_empty() {
            return Ok(0);
        }

        let routes = self.storage.list_routes().await?;
        for (index, post) in new_posts.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.dispatch_gap).await;
            }
            for route in &routes {
                if let Err(e) = self.sink.deliver(post, &route.webhook_url).await {
                    warn!(
                        post_id = %post.id,
                        group_id = %route.group_id,
                        error = ?e,
                        "Notification delivery failed"
                    );
                }
            }
        }

        Ok(new_posts.len())
    }

    /// On-demand check: load, persist and return the newest post.
    ///
    /// Rate-limited per caller and bounded by a hard deadline. On deadline
    /// expiry the underlying crawl is abandoned to finish in the background
    /// (it may still update the store); only this caller's result is
    /// discarded.
    pub async fn request_immediate_check(&self, caller: &str) -> Result<Vec<Post>, CheckError> {
        self.check_cooldown(caller).await?;

        let Some(guard) = self.try_begin() else {
            return Err(CheckError::Busy);
        };

        let source = self.source.clone();
        let storage = self.storage.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let candidates = source.extract_listing().await;
            detector::latest(&candidates, LATEST_COUNT, storage.as_ref()).await
        });

        match tokio::time::timeout(self.config.check_timeout, task).await {
            Ok(Ok(result)) => result.map_err(CheckError::from),
            Ok(Err(join_err)) => Err(CheckError::Failed(anyhow::anyhow!(
                "check task failed: {join_err}"
            ))),
            Err(_) => {
                warn!(caller, "On-demand check hit its deadline, abandoning the crawl");
                Err(CheckError::Timeout(self.config.check_timeout))
            }
        }
    }

    async fn check_cooldown(&self, caller: &str) -> Result<(), CheckError> {
        let mut cooldowns = self.cooldowns.lock().await;
        let now = Instant::now();

        if let Some(last) = cooldowns.get(caller) {
            let elapsed = now.duration_since(*last);
            if elapsed < self.config.check_cooldown {
                let remaining = self.config.check_cooldown - elapsed;
                return Err(CheckError::CooldownActive {
                    remaining_secs: remaining.as_secs().max(1),
                });
            }
        }

        cooldowns.insert(caller.to_string(), now);
        Ok(())
    }

    /// Whether a crawl is currently in flight.
    pub fn is_crawl_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlightGuard(self.in_flight.clone()))
    }

    /// Stop the timers and release owned resources.
    ///
    /// Idempotent, and safe to call even if initialization only partially
    /// completed (no cron registered, renderer never started).
    pub async fn cleanup(&self) {
        if let Some(mut scheduler) = self.cron.lock().await.take() {
            if let Err(e) = scheduler.shutdown().await {
                warn!(error = ?e, "Cron scheduler shutdown failed");
            }
        }
        self.source.close().await;
        info!("Scheduler cleaned up");
    }
}

/// Releases the in-flight flag when the cycle ends, however it ends.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
