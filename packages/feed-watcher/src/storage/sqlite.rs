use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::storage::Storage;
use crate::types::{ChannelRoute, Post, PostId, PostPage};

const LAST_HEAD_KEY: &str = "last_head_id";

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if missing) the database file at `path`.
    ///
    /// WAL journal mode lets the reporting API keep reading while a cycle
    /// commits its batch.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .context("Invalid database path")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to open database")?;

        Ok(Self { pool })
    }

    /// In-memory database for tests. Single connection, since each SQLite
    /// in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Invalid in-memory connection string")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        Ok(Self { pool })
    }

    /// Apply schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn insert_posts(&self, posts: &[Post]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }

        // One transaction per batch: a crash mid-cycle leaves either all of
        // the batch or none of it, never a partial set that would skew the
        // next cycle's existence checks.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin insert transaction")?;

        for post in posts {
            sqlx::query(
                r#"
                INSERT INTO posts (post_id, title, link, image, published_label, observed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT (post_id) DO NOTHING
                "#,
            )
            .bind(post.id.as_str())
            .bind(&post.title)
            .bind(&post.link)
            .bind(&post.image)
            .bind(&post.published_label)
            .bind(post.observed_at)
            .execute(&mut *tx)
            .await
            .context("Failed to insert post")?;
        }

        tx.commit()
            .await
            .context("Failed to commit insert transaction")?;
        Ok(())
    }

    async fn get_post(&self, id: &PostId) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT post_id, title, link, image, published_label, observed_at
            FROM posts
            WHERE post_id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get post")?;

        Ok(row.map(|r| row_to_post(&r)))
    }

    async fn list_posts(&self, page: u32, limit: u32) -> Result<PostPage> {
        let page = page.max(1);
        let offset = (page - 1) as i64 * limit as i64;

        let rows = sqlx::query(
            r#"
            SELECT post_id, title, link, image, published_label, observed_at
            FROM posts
            ORDER BY CAST(post_id AS INTEGER) DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list posts")?;

        let total = self.count_posts().await?;

        Ok(PostPage {
            posts: rows.iter().map(row_to_post).collect(),
            total,
            page,
            limit,
        })
    }

    async fn count_posts(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM posts")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count posts")?;
        Ok(row.get::<i64, _>("count") as u64)
    }

    async fn last_head_id(&self) -> Result<Option<PostId>> {
        let row = sqlx::query("SELECT value FROM meta WHERE key = ?1")
            .bind(LAST_HEAD_KEY)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read head cursor")?;

        Ok(row
            .and_then(|r| r.get::<Option<String>, _>("value"))
            .map(PostId::new))
    }

    async fn set_last_head_id(&self, id: &PostId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO meta (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(LAST_HEAD_KEY)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to write head cursor")?;
        Ok(())
    }

    async fn set_route(&self, group_id: &str, webhook_url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO routes (group_id, webhook_url) VALUES (?1, ?2)
            ON CONFLICT (group_id) DO UPDATE SET webhook_url = excluded.webhook_url
            "#,
        )
        .bind(group_id)
        .bind(webhook_url)
        .execute(&self.pool)
        .await
        .context("Failed to set route")?;
        Ok(())
    }

    async fn remove_route(&self, group_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM routes WHERE group_id = ?1")
            .bind(group_id)
            .execute(&self.pool)
            .await
            .context("Failed to remove route")?;
        Ok(())
    }

    async fn get_route(&self, group_id: &str) -> Result<Option<ChannelRoute>> {
        let row = sqlx::query("SELECT group_id, webhook_url FROM routes WHERE group_id = ?1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get route")?;

        Ok(row.map(|r| ChannelRoute {
            group_id: r.get("group_id"),
            webhook_url: r.get("webhook_url"),
        }))
    }

    async fn list_routes(&self) -> Result<Vec<ChannelRoute>> {
        let rows = sqlx::query("SELECT group_id, webhook_url FROM routes ORDER BY group_id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list routes")?;

        Ok(rows
            .into_iter()
            .map(|r| ChannelRoute {
                group_id: r.get("group_id"),
                webhook_url: r.get("webhook_url"),
            })
            .collect())
    }

    async fn count_routes(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM routes")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count routes")?;
        Ok(row.get::<i64, _>("count") as u64)
    }
}

fn row_to_post(row: &sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: PostId::new(row.get::<String, _>("post_id")),
        title: row.get("title"),
        link: row.get("link"),
        image: row.get("image"),
        published_label: row.get("published_label"),
        observed_at: row.get("observed_at"),
    }
}
