use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ChannelRoute, Post, PostId, PostPage};

pub mod sqlite;
pub use sqlite::SqliteStorage;

/// Storage boundary for the watcher (to allow in-memory fakes in tests).
#[async_trait]
pub trait Storage: Send + Sync {
    // Posts
    /// Insert posts as one atomic batch. Ids already present are left
    /// untouched: the first-seen payload wins and re-insertion is a no-op,
    /// never an error.
    async fn insert_posts(&self, posts: &[Post]) -> Result<()>;
    /// Point lookup by id; the existence check behind novelty detection.
    async fn get_post(&self, id: &PostId) -> Result<Option<Post>>;
    /// Stored posts, newest first by numeric id.
    async fn list_posts(&self, page: u32, limit: u32) -> Result<PostPage>;
    async fn count_posts(&self) -> Result<u64>;

    // Head cursor
    /// Id that topped the listing at the most recent successful cycle.
    /// Absent exactly when the watcher has never completed a cycle.
    async fn last_head_id(&self) -> Result<Option<PostId>>;
    async fn set_last_head_id(&self, id: &PostId) -> Result<()>;

    // Channel routes
    async fn set_route(&self, group_id: &str, webhook_url: &str) -> Result<()>;
    async fn remove_route(&self, group_id: &str) -> Result<()>;
    async fn get_route(&self, group_id: &str) -> Result<Option<ChannelRoute>>;
    async fn list_routes(&self) -> Result<Vec<ChannelRoute>>;
    async fn count_routes(&self) -> Result<u64>;
}
