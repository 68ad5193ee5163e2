use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use feed_watcher::RendererConfig;

use crate::kernel::SchedulerConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub renderer: RendererConfig,
    pub scheduler: SchedulerConfig,
    /// Optional webhook seeded as the "default" route at startup, so a
    /// fresh deployment notifies somewhere before any routes are managed.
    pub default_webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every value has a default; anything that fails to parse is fatal at
    /// launch, before the scheduler starts.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let mut renderer = RendererConfig::default();
        if let Ok(url) = env::var("SOURCE_URL") {
            renderer = renderer.with_source_url(url);
        }
        if let Ok(command) = env::var("RENDERER_CMD") {
            let args = env::var("RENDERER_ARGS")
                .map(|raw| raw.split_whitespace().map(String::from).collect())
                .unwrap_or_default();
            renderer = renderer.with_command(command, args);
        }
        if let Ok(port) = env::var("RENDERER_PORT") {
            renderer =
                renderer.with_port(port.parse().context("RENDERER_PORT must be a valid port")?);
        }

        let mut scheduler = SchedulerConfig::default();
        if let Ok(expr) = env::var("ACTIVE_CRON") {
            scheduler.active_cron = expr;
        }
        if let Ok(expr) = env::var("QUIET_CRON") {
            scheduler.quiet_cron = expr;
        }
        if let Ok(secs) = env::var("CHECK_COOLDOWN_SECS") {
            scheduler.check_cooldown = Duration::from_secs(
                secs.parse()
                    .context("CHECK_COOLDOWN_SECS must be a number of seconds")?,
            );
        }
        if let Ok(secs) = env::var("CHECK_TIMEOUT_SECS") {
            scheduler.check_timeout = Duration::from_secs(
                secs.parse()
                    .context("CHECK_TIMEOUT_SECS must be a number of seconds")?,
            );
        }

        Ok(Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/watch.db".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            renderer,
            scheduler,
            default_webhook_url: env::var("DISCORD_WEBHOOK_URL").ok(),
        })
    }
}
