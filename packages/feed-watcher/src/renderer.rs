//! Renderer session: owns the headless rendering sidecar process and turns
//! the watched listing page into candidate posts.
//!
//! The listing is produced by client-side script, so a plain HTTP fetch sees
//! an empty shell; rendering needs a real browser engine. The session spawns
//! a browserless-style sidecar (headless Chromium behind an HTTP `/content`
//! endpoint), keeps the process handle, and renders each extraction in a
//! fresh page that the sidecar closes afterwards. The process can crash or
//! hang independently of the scheduling loop, so every call health-checks
//! the handle first and failures degrade to "zero candidates" instead of
//! propagating into the cycle.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::RendererConfig;
use crate::error::RendererError;
use crate::extractor::{self, CARD_SELECTOR};
use crate::types::Post;

/// Chromium launch profile forwarded to the sidecar. Sandboxing is disabled
/// for containerized hosts and heap is capped so a leaking page cannot take
/// the host down with it.
const LAUNCH_FLAGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-dev-tools",
    "--no-first-run",
    "--no-zygote",
    "--disable-extensions",
    "--disable-background-networking",
    "--mute-audio",
    "--disable-software-rasterizer",
    "--disable-background-timer-throttling",
    "--js-flags=--max-old-space-size=256",
];

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Source of listing candidates (to allow faking the renderer in tests).
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch the current listing, newest first. Degrades to an empty list on
    /// failure; never fails the calling cycle.
    async fn extract_listing(&self) -> Vec<Post>;

    /// Terminate any owned resources. Safe to call repeatedly.
    async fn close(&self);
}

pub struct RendererSession {
    child: Mutex<Option<Child>>,
    client: reqwest::Client,
    config: RendererConfig,
}

impl RendererSession {
    pub fn new(config: RendererConfig) -> Self {
        // One render call spans navigation plus the selector wait; give the
        // HTTP request a little slack on top of those budgets.
        let request_timeout =
            config.navigation_timeout + config.selector_timeout + Duration::from_secs(5);

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            child: Mutex::new(None),
            client,
            config,
        }
    }

    /// Spawn the sidecar and wait for it to accept connections.
    pub async fn start(&self) -> Result<(), RendererError> {
        let mut slot = self.child.lock().await;
        self.start_locked(&mut slot).await
    }

    async fn start_locked(&self, slot: &mut Option<Child>) -> Result<(), RendererError> {
        if healthy(slot) {
            return Ok(());
        }

        let launch_args = serde_json::to_string(LAUNCH_FLAGS).unwrap_or_default();

        let child = Command::new(&self.config.command)
            .args(&self.config.args)
            .env("PORT", self.config.port.to_string())
            .env("DEFAULT_LAUNCH_ARGS", launch_args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RendererError::StartFailed(format!("spawn {}: {e}", self.config.command))
            })?;

        *slot = Some(child);

        if let Err(e) = self.wait_until_ready().await {
            teardown(slot).await;
            return Err(e);
        }

        info!(
            command = %self.config.command,
            port = self.config.port,
            "Renderer process started"
        );
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<(), RendererError> {
        let deadline = tokio::time::Instant::now() + self.config.startup_timeout;
        let probe = format!("http://127.0.0.1:{}/", self.config.port);

        loop {
            // Any HTTP response means the socket is up; the status is
            // irrelevant here.
            let attempt = self
                .client
                .get(&probe)
                .timeout(Duration::from_secs(2))
                .send()
                .await;
            if attempt.is_ok() {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(RendererError::StartFailed(format!(
                    "renderer did not accept connections on port {} within {:?}",
                    self.config.port, self.config.startup_timeout
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Whether the owned process handle is still connected to a live
    /// process.
    pub async fn is_healthy(&self) -> bool {
        let mut slot = self.child.lock().await;
        healthy(&mut slot)
    }

    /// Tear down (best-effort) and relaunch the sidecar.
    pub async fn restart(&self) -> Result<(), RendererError> {
        let mut slot = self.child.lock().await;
        teardown(&mut slot).await;
        self.start_locked(&mut slot).await
    }

    /// Render the listing page and return its DOM as HTML.
    async fn render(&self) -> Result<String, RendererError> {
        let endpoint = format!("http://127.0.0.1:{}/content", self.config.port);

        // domcontentloaded: proceed at parse-complete instead of waiting for
        // every subresource. bestAttempt: a listing whose card markup never
        // appears within the selector budget is returned as-is, so a
        // structurally changed page degrades to zero candidates.
        let body = serde_json::json!({
            "url": self.config.source_url,
            "userAgent": USER_AGENT,
            "gotoOptions": {
                "waitUntil": "domcontentloaded",
                "timeout": self.config.navigation_timeout.as_millis() as u64,
            },
            "waitForSelector": {
                "selector": CARD_SELECTOR,
                "timeout": self.config.selector_timeout.as_millis() as u64,
            },
            "bestAttempt": true,
        });

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RendererError::SessionDied(e.to_string())
                } else {
                    RendererError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RendererError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .text()
            .await
            .map_err(|e| RendererError::Network(e.to_string()))
    }
}

#[async_trait]
impl ListingSource for RendererSession {
    async fn extract_listing(&self) -> Vec<Post> {
        // Self-healing: a dead process gets exactly one restart attempt per
        // cycle. If that fails the session is left unstarted so the next
        // cycle retries the full start sequence instead of hammering a
        // possibly rate-limiting source.
        if !self.is_healthy().await {
            warn!("Renderer process is not running, restarting");
            if let Err(e) = self.restart().await {
                error!(error = %e, "Renderer restart failed, skipping extraction this cycle");
                return Vec::new();
            }
        }

        let html = match self.render().await {
            Ok(html) => html,
            Err(e @ RendererError::SessionDied(_)) => {
                warn!(error = %e, "Renderer session died mid-extraction, will restart next cycle");
                let mut slot = self.child.lock().await;
                teardown(&mut slot).await;
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "Extraction failed, treating listing as empty");
                return Vec::new();
            }
        };

        let posts = extractor::extract_posts(&html, &self.config.source_url);
        debug!(candidates = posts.len(), "Renderer produced candidates");
        posts
    }

    async fn close(&self) {
        let mut slot = self.child.lock().await;
        if slot.is_some() {
            teardown(&mut slot).await;
            info!("Renderer process terminated");
        }
    }
}

/// try_wait reports Ok(None) while the process is still running.
fn healthy(slot: &mut Option<Child>) -> bool {
    match slot.as_mut() {
        Some(child) => matches!(child.try_wait(), Ok(None)),
        None => false,
    }
}

/// Best-effort teardown; errors from an already-dead process are swallowed.
async fn teardown(slot: &mut Option<Child>) {
    if let Some(mut child) = slot.take() {
        let _ = child.kill().await;
    }
}
