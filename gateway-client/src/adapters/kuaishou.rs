//! Kuaishou adapter.
//!
//! All listings paginate with a `pcursor` string whose special value
//! `"no_more"` doubles as the termination signal; there is no separate
//! `has_more` flag. Posts ("photos") are video-first, with image sets
//! arriving as an `atlas` list. Counters occasionally come back as display
//! strings.

use super::{
    count_field, item_array, required_str, str_field, unix_seconds, PageOp, PlatformAdapter,
    RawPage,
};
use crate::api::GatewayRequest;
use serde_json::Value;
use trendlens_core::{AdapterError, Comment, Platform, Post, PostType};

/// pcursor value meaning the listing is exhausted.
const PCURSOR_DONE: &str = "no_more";

/// Sentinel for "no parent" on comment items.
const NO_PARENT: &str = "0";

pub struct KuaishouAdapter;

impl KuaishouAdapter {
    /// Ranked renditions from `main_mv_urls` lead (first listed is the
    /// default quality), plain `photoUrl` is the fallback.
    fn select_video_urls(raw: &Value) -> Vec<String> {
        let mut urls = Vec::new();

        if let Some(renditions) = raw.get("main_mv_urls").and_then(Value::as_array) {
            for rendition in renditions {
                if let Some(url) = str_field(rendition, "url") {
                    if !urls.contains(&url) {
                        urls.push(url);
                    }
                }
            }
        }

        if let Some(url) = str_field(raw, "photoUrl") {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }

        urls
    }
}

impl PlatformAdapter for KuaishouAdapter {
    fn platform(&self) -> Platform {
        Platform::Kuaishou
    }

    fn to_post(&self, raw: &Value) -> Result<Post, AdapterError> {
        // Search hits and feed items wrap the photo
        let raw = raw.get("photo").unwrap_or(raw);

        let platform_item_id = match str_field(raw, "photo_id") {
            Some(id) => id,
            None => required_str(raw, "id")?,
        };
        let author = raw.get("author").cloned().unwrap_or(Value::Null);

        let atlas = raw.get("atlas").and_then(Value::as_array);
        let video_urls = Self::select_video_urls(raw);

        let (post_type, video_urls, image_urls) = match atlas {
            Some(images) if !images.is_empty() => {
                let image_urls = images
                    .iter()
                    .filter_map(|img| str_field(img, "url"))
                    .collect();
                (PostType::Image, Vec::new(), image_urls)
            }
            _ if !video_urls.is_empty() => (PostType::Video, video_urls, Vec::new()),
            _ => {
                return Err(AdapterError::UnknownPostType {
                    item_id: platform_item_id,
                })
            }
        };

        let cover_url = str_field(raw, "coverUrl").or_else(|| {
            raw.get("cover_thumbnail_urls")
                .and_then(Value::as_array)
                .and_then(|list| list.first())
                .and_then(|c| str_field(c, "url"))
        });

        Ok(Post {
            platform: Platform::Kuaishou,
            platform_item_id,
            title: str_field(raw, "caption").unwrap_or_default(),
            body: None,
            post_type,
            author_id: str_field(&author, "id")
                .or_else(|| str_field(raw, "userId"))
                .unwrap_or_default(),
            author_name: str_field(&author, "name")
                .or_else(|| str_field(raw, "userName"))
                .unwrap_or_default(),
            play_count: count_field(raw, &["viewCount", "view_count"]),
            like_count: count_field(raw, &["realLikeCount", "likeCount", "like_count"]),
            comment_count: count_field(raw, &["commentCount", "comment_count"]),
            share_count: count_field(raw, &["shareCount", "forwardCount"]),
            cover_url,
            video_urls,
            image_urls,
            published_at: unix_seconds(raw.get("timestamp")),
            raw_payload: raw.clone(),
        })
    }

    fn to_comment(&self, raw: &Value, post_id: i64) -> Result<Comment, AdapterError> {
        let platform_comment_id = match str_field(raw, "commentId") {
            Some(id) => id,
            None => required_str(raw, "comment_id")?,
        };

        let parent_platform_comment_id = str_field(raw, "replyToCommentId")
            .or_else(|| str_field(raw, "replyTo"))
            .filter(|id| id != NO_PARENT);

        Ok(Comment {
            platform: Platform::Kuaishou,
            platform_comment_id,
            post_id,
            author_id: str_field(raw, "authorId").unwrap_or_default(),
            author_name: str_field(raw, "authorName").unwrap_or_default(),
            author_avatar: str_field(raw, "headurl"),
            content: str_field(raw, "content").unwrap_or_default(),
            like_count: count_field(raw, &["likedCount", "likeCount"]),
            reply_count: count_field(raw, &["subCommentCount", "replyCount"]),
            published_at: unix_seconds(raw.get("timestamp")),
            parent_platform_comment_id,
            parent_id: None,
        })
    }

    fn post_detail_request(&self, item_id: &str) -> GatewayRequest {
        GatewayRequest::get("/api/v1/kuaishou/web/fetch_one_photo").with_param("photo_id", item_id)
    }

    fn page_request(&self, op: &PageOp, cursor: Option<&str>, page_size: u32) -> GatewayRequest {
        let pcursor = cursor.unwrap_or("");
        match op {
            PageOp::Search { keyword } => {
                GatewayRequest::get("/api/v1/kuaishou/web/fetch_search_videos")
                    .with_param("keyword", keyword)
                    .with_param("pcursor", pcursor)
                    .with_param("count", page_size.to_string())
            }
            PageOp::Comments { item_id } => {
                GatewayRequest::get("/api/v1/kuaishou/web/fetch_photo_comments")
                    .with_param("photo_id", item_id)
                    .with_param("pcursor", pcursor)
            }
            PageOp::Replies {
                item_id,
                comment_id,
            } => GatewayRequest::get("/api/v1/kuaishou/web/fetch_comment_sub_comments")
                .with_param("photo_id", item_id)
                .with_param("rootCommentId", comment_id)
                .with_param("pcursor", pcursor),
        }
    }

    fn extract_post_detail(&self, data: &Value) -> Result<Value, AdapterError> {
        if let Some(photo) = data.get("photo") {
            if !photo.is_null() {
                return Ok(photo.clone());
            }
        }
        if data.get("photo_id").is_some() || data.get("id").is_some() {
            return Ok(data.clone());
        }
        Err(AdapterError::MissingField {
            field: "photo".to_string(),
        })
    }

    fn parse_page(
        &self,
        op: &PageOp,
        _prev_cursor: Option<&str>,
        data: &Value,
    ) -> Result<RawPage, AdapterError> {
        let items = match op {
            PageOp::Search { .. } => item_array(data, "photos"),
            PageOp::Comments { .. } | PageOp::Replies { .. } => {
                let comments = item_array(data, "comments");
                if comments.is_empty() {
                    item_array(data, "rootComments")
                } else {
                    comments
                }
            }
        };

        // pcursor is carried verbatim; "no_more" (or its absence) terminates
        let next_cursor = str_field(data, "pcursor");
        let has_more = matches!(next_cursor.as_deref(), Some(c) if c != PCURSOR_DONE);

        Ok(RawPage {
            items,
            next_cursor,
            has_more,
        })
    }
}
