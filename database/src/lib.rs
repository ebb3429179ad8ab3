//! SQLite persistence gateway for normalized posts and comments.
//!
//! All writes are idempotent upserts keyed on natural keys: re-submitting a
//! batch refreshes mutable fields without duplicating rows, so "retry the
//! same batch" is always a safe remediation. Parent links get a separate
//! link-only update that never touches content or counters.

mod row;

pub use row::{StoredComment, StoredPost};

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};
use trendlens_core::{Comment, CoreError, DatabaseError, Platform, Post};

/// Rows per transaction. Oversized batches are chunked transparently so a
/// single store round-trip never grows past what SQLite handles quickly.
const MAX_BATCH_ROWS: usize = 100;

const UPSERT_POST_SQL: &str = r#"
    INSERT INTO posts (
        platform, platform_item_id, title, body, post_type,
        author_id, author_name,
        play_count, like_count, comment_count, share_count,
        cover_url, video_urls, image_urls, published_at, raw_payload,
        created_at, updated_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
    ON CONFLICT(platform, platform_item_id) DO UPDATE SET
        title = excluded.title,
        body = excluded.body,
        post_type = excluded.post_type,
        author_id = excluded.author_id,
        author_name = excluded.author_name,
        play_count = excluded.play_count,
        like_count = excluded.like_count,
        comment_count = excluded.comment_count,
        share_count = excluded.share_count,
        cover_url = excluded.cover_url,
        video_urls = excluded.video_urls,
        image_urls = excluded.image_urls,
        published_at = excluded.published_at,
        raw_payload = excluded.raw_payload,
        updated_at = excluded.updated_at
    RETURNING *
"#;

// parent_id keeps an already-resolved link when a re-ingested row arrives
// unresolved; post_id never moves between posts.
const UPSERT_COMMENT_SQL: &str = r#"
    INSERT INTO comments (
        platform, platform_comment_id, post_id,
        author_id, author_name, author_avatar, content,
        like_count, reply_count, published_at,
        parent_platform_comment_id, parent_id,
        created_at, updated_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
    ON CONFLICT(platform, platform_comment_id) DO UPDATE SET
        author_id = excluded.author_id,
        author_name = excluded.author_name,
        author_avatar = excluded.author_avatar,
        content = excluded.content,
        like_count = excluded.like_count,
        reply_count = excluded.reply_count,
        published_at = excluded.published_at,
        parent_platform_comment_id =
            COALESCE(excluded.parent_platform_comment_id, comments.parent_platform_comment_id),
        parent_id = COALESCE(excluded.parent_id, comments.parent_id),
        updated_at = excluded.updated_at
    RETURNING *
"#;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the store, creating the database file if needed.
    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                CoreError::Database(DatabaseError::ConnectionFailed {
                    reason: e.to_string(),
                })
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                CoreError::Database(DatabaseError::ConnectionFailed {
                    reason: e.to_string(),
                })
            })?;

        info!("Connected to database at {}", database_url);
        Ok(Self { pool })
    }

    /// Wrap an existing pool. The pool is the only resource shared across
    /// concurrent ingestion invocations.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bootstrap the two ingestion tables and their indexes.
    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                platform_item_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                body TEXT,
                post_type TEXT NOT NULL,
                author_id TEXT NOT NULL DEFAULT '',
                author_name TEXT NOT NULL DEFAULT '',
                play_count INTEGER NOT NULL DEFAULT 0,
                like_count INTEGER NOT NULL DEFAULT 0,
                comment_count INTEGER NOT NULL DEFAULT 0,
                share_count INTEGER NOT NULL DEFAULT 0,
                cover_url TEXT,
                video_urls TEXT NOT NULL DEFAULT '[]',
                image_urls TEXT NOT NULL DEFAULT '[]',
                published_at INTEGER NOT NULL DEFAULT 0,
                raw_payload TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(platform, platform_item_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| migration_error("posts", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                platform_comment_id TEXT NOT NULL,
                post_id INTEGER NOT NULL REFERENCES posts(id),
                author_id TEXT NOT NULL DEFAULT '',
                author_name TEXT NOT NULL DEFAULT '',
                author_avatar TEXT,
                content TEXT NOT NULL DEFAULT '',
                like_count INTEGER NOT NULL DEFAULT 0,
                reply_count INTEGER NOT NULL DEFAULT 0,
                published_at INTEGER NOT NULL DEFAULT 0,
                parent_platform_comment_id TEXT,
                parent_id INTEGER REFERENCES comments(id),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(platform, platform_comment_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| migration_error("comments", e))?;

        for index_sql in [
            "CREATE INDEX IF NOT EXISTS idx_posts_platform ON posts(platform)",
            "CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id)",
            "CREATE INDEX IF NOT EXISTS idx_comments_parent_native
                 ON comments(platform, parent_platform_comment_id)",
        ] {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| migration_error("indexes", e))?;
        }

        Ok(())
    }

    /// Upsert a batch of posts, returning the stored rows in input order.
    ///
    /// Conflict target is `(platform, platform_item_id)`: an existing row
    /// gets its mutable fields refreshed, a new one is created. Callers
    /// never need to know storage ids in advance.
    pub async fn upsert_posts(&self, posts: &[Post]) -> Result<Vec<StoredPost>, CoreError> {
        let mut stored = Vec::with_capacity(posts.len());
        let now = Utc::now().timestamp();

        for chunk in posts.chunks(MAX_BATCH_ROWS) {
            let mut tx = self.pool.begin().await.map_err(|e| {
                CoreError::Database(DatabaseError::TransactionFailed {
                    reason: e.to_string(),
                })
            })?;

            for post in chunk {
                let video_urls = serde_json::to_string(&post.video_urls)?;
                let image_urls = serde_json::to_string(&post.image_urls)?;
                let raw_payload = serde_json::to_string(&post.raw_payload)?;

                let row = sqlx::query_as::<_, StoredPost>(UPSERT_POST_SQL)
                    .bind(post.platform.as_str())
                    .bind(&post.platform_item_id)
                    .bind(&post.title)
                    .bind(&post.body)
                    .bind(post.post_type.as_str())
                    .bind(&post.author_id)
                    .bind(&post.author_name)
                    .bind(post.play_count)
                    .bind(post.like_count)
                    .bind(post.comment_count)
                    .bind(post.share_count)
                    .bind(&post.cover_url)
                    .bind(&video_urls)
                    .bind(&image_urls)
                    .bind(post.published_at)
                    .bind(&raw_payload)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(DatabaseError::from)?;

                stored.push(row);
            }

            tx.commit().await.map_err(|e| {
                CoreError::Database(DatabaseError::TransactionFailed {
                    reason: e.to_string(),
                })
            })?;
        }

        debug!("Upserted {} posts", stored.len());
        Ok(stored)
    }

    /// Upsert a batch of comments, returning the stored rows in input order.
    ///
    /// Conflict target is `(platform, platform_comment_id)`. An incoming row
    /// with `parent_id = None` never clears a link resolved earlier.
    pub async fn upsert_comments(
        &self,
        comments: &[Comment],
    ) -> Result<Vec<StoredComment>, CoreError> {
        let mut stored = Vec::with_capacity(comments.len());
        let now = Utc::now().timestamp();

        for chunk in comments.chunks(MAX_BATCH_ROWS) {
            let mut tx = self.pool.begin().await.map_err(|e| {
                CoreError::Database(DatabaseError::TransactionFailed {
                    reason: e.to_string(),
                })
            })?;

            for comment in chunk {
                let row = sqlx::query_as::<_, StoredComment>(UPSERT_COMMENT_SQL)
                    .bind(comment.platform.as_str())
                    .bind(&comment.platform_comment_id)
                    .bind(comment.post_id)
                    .bind(&comment.author_id)
                    .bind(&comment.author_name)
                    .bind(&comment.author_avatar)
                    .bind(&comment.content)
                    .bind(comment.like_count)
                    .bind(comment.reply_count)
                    .bind(comment.published_at)
                    .bind(&comment.parent_platform_comment_id)
                    .bind(comment.parent_id)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(DatabaseError::from)?;

                stored.push(row);
            }

            tx.commit().await.map_err(|e| {
                CoreError::Database(DatabaseError::TransactionFailed {
                    reason: e.to_string(),
                })
            })?;
        }

        debug!("Upserted {} comments", stored.len());
        Ok(stored)
    }

    /// Link-only update: set `parent_id` on one comment, touching nothing
    /// else. Returns `None` when the target row does not exist.
    pub async fn update_comment_parent_link(
        &self,
        platform: Platform,
        platform_comment_id: &str,
        parent_id: i64,
        post_id: i64,
    ) -> Result<Option<StoredComment>, CoreError> {
        let now = Utc::now().timestamp();

        let row = sqlx::query_as::<_, StoredComment>(
            r#"
            UPDATE comments
            SET parent_id = ?1, updated_at = ?2
            WHERE platform = ?3 AND platform_comment_id = ?4 AND post_id = ?5
            RETURNING *
            "#,
        )
        .bind(parent_id)
        .bind(now)
        .bind(platform.as_str())
        .bind(platform_comment_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(row)
    }

    /// Look up a post by its natural key.
    pub async fn get_post(
        &self,
        platform: Platform,
        platform_item_id: &str,
    ) -> Result<Option<StoredPost>, CoreError> {
        let row = sqlx::query_as::<_, StoredPost>(
            "SELECT * FROM posts WHERE platform = ?1 AND platform_item_id = ?2",
        )
        .bind(platform.as_str())
        .bind(platform_item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(row)
    }

    pub async fn get_posts_for_platform(
        &self,
        platform: Platform,
    ) -> Result<Vec<StoredPost>, CoreError> {
        let rows = sqlx::query_as::<_, StoredPost>(
            "SELECT * FROM posts WHERE platform = ?1 ORDER BY published_at DESC, id DESC",
        )
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(rows)
    }

    pub async fn get_comments_for_post(
        &self,
        post_id: i64,
    ) -> Result<Vec<StoredComment>, CoreError> {
        let rows = sqlx::query_as::<_, StoredComment>(
            "SELECT * FROM comments WHERE post_id = ?1 ORDER BY published_at ASC, id ASC",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(rows)
    }
}

fn migration_error(migration: &str, error: sqlx::Error) -> CoreError {
    tracing::error!("Migration {} failed: {}", migration, error);
    CoreError::Database(DatabaseError::MigrationFailed {
        migration: migration.to_string(),
    })
}
