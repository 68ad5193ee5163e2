//! Discord webhook notification sink.
//!
//! Delivery is best-effort per destination: a failing webhook is logged by
//! the caller and never affects other destinations, the cycle, or the store.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use feed_watcher::types::Post;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

/// Delivery boundary for newly detected posts (to allow fakes in tests).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one post to one destination.
    async fn deliver(&self, post: &Post, webhook_url: &str) -> Result<()>;
}

const EMBED_COLOR: u32 = 0x5865f2;
const BOT_USERNAME: &str = "StelLive Bot";
const AVATAR_URL: &str = "https://cdn.discordapp.com/embed/avatars/0.png";
const FOOTER_TEXT: &str = "fanding.kr StelLive watch";

#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Plain-content liveness ping, used when wiring up a new route.
    pub async fn send_test_message(&self, webhook_url: &str) -> Result<()> {
        let payload = WebhookPayload {
            username: BOT_USERNAME,
            avatar_url: AVATAR_URL,
            content: Some("The watcher is up and can reach this channel.".to_string()),
            embeds: Vec::new(),
        };
        self.post_with_retry(webhook_url, &payload).await
    }

    async fn post_with_retry(&self, webhook_url: &str, payload: &WebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let result = self
                .client
                .post(webhook_url)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            match result {
                Ok(response) => {
                    if let Err(e) = response.error_for_status_ref() {
                        if attempt < self.max_retries {
                            backoff(attempt).await;
                            continue;
                        }
                        return Err(anyhow!("Discord webhook HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        backoff(attempt).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook request failed: {e}"));
                }
            }
        }
    }
}

impl Default for DiscordNotifier {
    fn default() -> Self {
        Self::new()
    }
}

async fn backoff(attempt: u8) {
    tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    async fn deliver(&self, post: &Post, webhook_url: &str) -> Result<()> {
        let embed = Embed {
            title: "New StelLive post".to_string(),
            description: post.title.clone(),
            url: post.link.clone(),
            color: EMBED_COLOR,
            fields: vec![
                EmbedField {
                    name: "Link".to_string(),
                    value: format!("[Open the post]({})", post.link),
                    inline: false,
                },
                EmbedField {
                    name: "Posted".to_string(),
                    value: post
                        .published_label
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    inline: true,
                },
            ],
            thumbnail: post.image.clone().map(|url| EmbedThumbnail { url }),
            footer: EmbedFooter {
                text: FOOTER_TEXT.to_string(),
            },
            timestamp: Utc::now().to_rfc3339(),
        };

        let payload = WebhookPayload {
            username: BOT_USERNAME,
            avatar_url: AVATAR_URL,
            content: None,
            embeds: vec![embed],
        };

        self.post_with_retry(webhook_url, &payload).await?;
        debug!(post_id = %post.id, "Notification delivered");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload {
    username: &'static str,
    avatar_url: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    embeds: Vec<Embed>,
}

#[derive(Serialize)]
struct Embed {
    title: String,
    description: String,
    url: String,
    color: u32,
    fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedThumbnail>,
    footer: EmbedFooter,
    timestamp: String,
}

#[derive(Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Serialize)]
struct EmbedThumbnail {
    url: String,
}

#[derive(Serialize)]
struct EmbedFooter {
    text: String,
}
