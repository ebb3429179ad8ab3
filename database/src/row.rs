//! Stored row types for the two ingestion tables.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// A persisted post row. `id` is the storage id comment rows reference.
#[derive(Debug, Clone)]
pub struct StoredPost {
    pub id: i64,
    pub platform: String,
    pub platform_item_id: String,
    pub title: String,
    pub body: Option<String>,
    pub post_type: String,
    pub author_id: String,
    pub author_name: String,
    pub play_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub cover_url: Option<String>,
    pub video_urls: Vec<String>,
    pub image_urls: Vec<String>,
    pub published_at: i64,
    /// Raw upstream payload as stored (JSON text).
    pub raw_payload: String,
    pub created_at: i64,
    pub updated_at: i64,
}

// Manual mapping: the media URL lists live in JSON text columns.
impl FromRow<'_, SqliteRow> for StoredPost {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let video_urls: String = row.try_get("video_urls")?;
        let image_urls: String = row.try_get("image_urls")?;

        Ok(Self {
            id: row.try_get("id")?,
            platform: row.try_get("platform")?,
            platform_item_id: row.try_get("platform_item_id")?,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            post_type: row.try_get("post_type")?,
            author_id: row.try_get("author_id")?,
            author_name: row.try_get("author_name")?,
            play_count: row.try_get("play_count")?,
            like_count: row.try_get("like_count")?,
            comment_count: row.try_get("comment_count")?,
            share_count: row.try_get("share_count")?,
            cover_url: row.try_get("cover_url")?,
            video_urls: decode_url_list(&video_urls, "video_urls")?,
            image_urls: decode_url_list(&image_urls, "image_urls")?,
            published_at: row.try_get("published_at")?,
            raw_payload: row.try_get("raw_payload")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn decode_url_list(raw: &str, column: &str) -> Result<Vec<String>, sqlx::Error> {
    serde_json::from_str(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// A persisted comment row.
///
/// `parent_platform_comment_id` is always present for replies;
/// `parent_id` may lag behind until the tree resolver links it.
#[derive(Debug, Clone, FromRow)]
pub struct StoredComment {
    pub id: i64,
    pub platform: String,
    pub platform_comment_id: String,
    pub post_id: i64,
    pub author_id: String,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub content: String,
    pub like_count: i64,
    pub reply_count: i64,
    pub published_at: i64,
    pub parent_platform_comment_id: Option<String>,
    pub parent_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}
