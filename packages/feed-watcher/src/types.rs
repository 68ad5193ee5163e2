use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source-assigned identifier of a post, parsed from its card link.
///
/// Ids are unique per post but not guaranteed monotonic or contiguous, so
/// nothing in the watcher may order-compare them for novelty decisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Best-effort numeric reading of the id. Ids are usually decimal but
    /// the source does not promise it.
    pub fn as_numeric(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A post observed on the watched listing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    /// Display title; extraction falls back to a placeholder, never empty.
    pub title: String,
    /// Canonical absolute URL of the post.
    pub link: String,
    /// Thumbnail URL, when the card carries one.
    pub image: Option<String>,
    /// Source-provided timestamp text. Display only, not parseable.
    pub published_label: Option<String>,
    /// When this watcher first saw the post (system clock, not source).
    pub observed_at: DateTime<Utc>,
}

impl Post {
    pub fn new(
        id: PostId,
        title: String,
        link: String,
        image: Option<String>,
        published_label: Option<String>,
    ) -> Self {
        Self {
            id,
            title,
            link,
            image,
            published_label,
            observed_at: Utc::now(),
        }
    }
}

/// One page of stored posts, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Mapping from an external group to its delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRoute {
    pub group_id: String,
    pub webhook_url: String,
}
