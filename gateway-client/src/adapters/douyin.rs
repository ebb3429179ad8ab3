//! Douyin adapter.
//!
//! Detail payloads carry the post under `aweme_detail`; search items wrap it
//! in `aweme_info`. Comment pages use a numeric offset cursor rendered as a
//! string, and `has_more` arrives as 0/1. Reply items carry `reply_id` (the
//! thread root) plus `reply_to_reply_id` (the immediate parent, `"0"` when
//! the reply targets the root). Parent linkage must use the immediate
//! parent so multi-level threads survive.

use super::{
    bool_flag, count_field, item_array, required_str, str_field, unix_seconds, PageOp,
    PlatformAdapter, RawPage,
};
use crate::api::GatewayRequest;
use serde_json::Value;
use trendlens_core::{AdapterError, Comment, Platform, Post, PostType};

/// Sentinel Douyin uses for "no parent".
const NO_PARENT: &str = "0";

pub struct DouyinAdapter;

impl DouyinAdapter {
    /// Best playable URL first: prefer the first mp4 entry in `bit_rate`,
    /// then fall back to the plain `play_addr` list. Same input, same order.
    fn select_video_urls(video: &Value) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();

        if let Some(bit_rates) = video.get("bit_rate").and_then(Value::as_array) {
            for entry in bit_rates {
                let is_mp4 = entry
                    .get("format")
                    .and_then(Value::as_str)
                    .map(|f| f == "mp4")
                    .unwrap_or(false);
                if !is_mp4 {
                    continue;
                }
                if let Some(url) = first_url(entry.get("play_addr")) {
                    if !urls.contains(&url) {
                        urls.push(url);
                    }
                }
            }
        }

        if let Some(play_addr) = video.get("play_addr").and_then(|v| v.get("url_list")) {
            if let Some(list) = play_addr.as_array() {
                for url in list.iter().filter_map(Value::as_str) {
                    let url = url.to_string();
                    if !urls.contains(&url) {
                        urls.push(url);
                    }
                }
            }
        }

        urls
    }

    /// Immediate parent id for a comment, or `None` for top-level.
    fn parent_of(raw: &Value) -> Option<String> {
        // reply_to_reply_id points at the immediate parent within a thread;
        // reply_id is the thread root. "0" means "not set" for both.
        for key in ["reply_to_reply_id", "reply_id"] {
            if let Some(id) = str_field(raw, key) {
                if id != NO_PARENT {
                    return Some(id);
                }
            }
        }
        None
    }
}

fn first_url(addr: Option<&Value>) -> Option<String> {
    addr.and_then(|a| a.get("url_list"))
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl PlatformAdapter for DouyinAdapter {
    fn platform(&self) -> Platform {
        Platform::Douyin
    }

    fn to_post(&self, raw: &Value) -> Result<Post, AdapterError> {
        // Search hits wrap the detail in aweme_info
        let raw = raw.get("aweme_info").unwrap_or(raw);

        let platform_item_id = required_str(raw, "aweme_id")?;
        let statistics = raw.get("statistics").cloned().unwrap_or(Value::Null);
        let author = raw.get("author").cloned().unwrap_or(Value::Null);

        let images = raw.get("images").and_then(Value::as_array);
        let video = raw.get("video");

        let (post_type, video_urls, image_urls) = match (images, video) {
            (Some(images), _) if !images.is_empty() => {
                let image_urls = images
                    .iter()
                    .filter_map(|img| first_url(Some(img)))
                    .collect();
                (PostType::Image, Vec::new(), image_urls)
            }
            (_, Some(video)) if !video.is_null() => {
                (PostType::Video, Self::select_video_urls(video), Vec::new())
            }
            _ => {
                return Err(AdapterError::UnknownPostType {
                    item_id: platform_item_id,
                })
            }
        };

        let cover_url = raw.get("video").and_then(|v| first_url(v.get("cover")));

        Ok(Post {
            platform: Platform::Douyin,
            platform_item_id,
            title: str_field(raw, "desc").unwrap_or_default(),
            body: None,
            post_type,
            author_id: str_field(&author, "uid").unwrap_or_default(),
            author_name: str_field(&author, "nickname").unwrap_or_default(),
            play_count: count_field(&statistics, &["play_count"]),
            like_count: count_field(&statistics, &["digg_count"]),
            comment_count: count_field(&statistics, &["comment_count"]),
            share_count: count_field(&statistics, &["share_count"]),
            cover_url,
            video_urls,
            image_urls,
            published_at: unix_seconds(raw.get("create_time")),
            raw_payload: raw.clone(),
        })
    }

    fn to_comment(&self, raw: &Value, post_id: i64) -> Result<Comment, AdapterError> {
        let platform_comment_id = required_str(raw, "cid")?;
        let user = raw.get("user").cloned().unwrap_or(Value::Null);

        Ok(Comment {
            platform: Platform::Douyin,
            platform_comment_id,
            post_id,
            author_id: str_field(&user, "uid").unwrap_or_default(),
            author_name: str_field(&user, "nickname").unwrap_or_default(),
            author_avatar: first_url(user.get("avatar_thumb")),
            content: str_field(raw, "text").unwrap_or_default(),
            like_count: count_field(raw, &["digg_count"]),
            reply_count: count_field(raw, &["reply_comment_total", "reply_count"]),
            published_at: unix_seconds(raw.get("create_time")),
            parent_platform_comment_id: Self::parent_of(raw),
            parent_id: None,
        })
    }

    fn post_detail_request(&self, item_id: &str) -> GatewayRequest {
        GatewayRequest::get("/api/v1/douyin/web/fetch_one_video").with_param("aweme_id", item_id)
    }

    fn page_request(&self, op: &PageOp, cursor: Option<&str>, page_size: u32) -> GatewayRequest {
        let cursor = cursor.unwrap_or("0");
        match op {
            PageOp::Search { keyword } => {
                GatewayRequest::get("/api/v1/douyin/web/fetch_video_search_result")
                    .with_param("keyword", keyword)
                    .with_param("offset", cursor)
                    .with_param("count", page_size.to_string())
            }
            PageOp::Comments { item_id } => {
                GatewayRequest::get("/api/v1/douyin/web/fetch_video_comments")
                    .with_param("aweme_id", item_id)
                    .with_param("cursor", cursor)
                    .with_param("count", page_size.to_string())
            }
            PageOp::Replies {
                item_id,
                comment_id,
            } => GatewayRequest::get("/api/v1/douyin/web/fetch_video_comment_replies")
                .with_param("item_id", item_id)
                .with_param("comment_id", comment_id)
                .with_param("cursor", cursor)
                .with_param("count", page_size.to_string()),
        }
    }

    fn extract_post_detail(&self, data: &Value) -> Result<Value, AdapterError> {
        if let Some(detail) = data.get("aweme_detail") {
            if !detail.is_null() {
                return Ok(detail.clone());
            }
        }
        if data.get("aweme_id").is_some() {
            return Ok(data.clone());
        }
        Err(AdapterError::MissingField {
            field: "aweme_detail".to_string(),
        })
    }

    fn parse_page(
        &self,
        op: &PageOp,
        _prev_cursor: Option<&str>,
        data: &Value,
    ) -> Result<RawPage, AdapterError> {
        let items = match op {
            PageOp::Search { .. } => item_array(data, "data"),
            PageOp::Comments { .. } | PageOp::Replies { .. } => item_array(data, "comments"),
        };

        let next_cursor = str_field(data, "cursor");
        let has_more = bool_flag(data.get("has_more"));

        Ok(RawPage {
            items,
            next_cursor,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn video_item() -> Value {
        json!({
            "aweme_id": "7499608775142608186",
            "desc": "latte art tutorial",
            "create_time": 1714000000,
            "author": { "uid": "u100", "nickname": "barista" },
            "statistics": {
                "play_count": 120000,
                "digg_count": 100,
                "comment_count": 45,
                "share_count": 12
            },
            "video": {
                "cover": { "url_list": ["https://cdn.example.com/cover.jpg"] },
                "play_addr": { "url_list": ["https://cdn.example.com/play_default"] },
                "bit_rate": [
                    { "format": "dash", "play_addr": { "url_list": ["https://cdn.example.com/dash"] } },
                    { "format": "mp4", "play_addr": { "url_list": ["https://cdn.example.com/mp4_hi"] } },
                    { "format": "mp4", "play_addr": { "url_list": ["https://cdn.example.com/mp4_lo"] } }
                ]
            }
        })
    }

    #[test]
    fn test_to_post_video() {
        let post = DouyinAdapter.to_post(&video_item()).unwrap();

        assert_eq!(post.platform, Platform::Douyin);
        assert_eq!(post.platform_item_id, "7499608775142608186");
        assert_eq!(post.post_type, PostType::Video);
        assert_eq!(post.title, "latte art tutorial");
        assert_eq!(post.like_count, 100);
        assert_eq!(post.play_count, 120000);
        assert_eq!(post.published_at, 1714000000);
        assert_eq!(
            post.cover_url.as_deref(),
            Some("https://cdn.example.com/cover.jpg")
        );
    }

    #[test]
    fn test_best_video_url_prefers_mp4() {
        let post = DouyinAdapter.to_post(&video_item()).unwrap();

        // First mp4 bit_rate entry wins; plain play_addr trails as fallback
        assert_eq!(post.video_urls[0], "https://cdn.example.com/mp4_hi");
        assert!(post
            .video_urls
            .contains(&"https://cdn.example.com/play_default".to_string()));

        // Deterministic: mapping the same input twice picks the same URL
        let again = DouyinAdapter.to_post(&video_item()).unwrap();
        assert_eq!(post.video_urls, again.video_urls);
    }

    #[test]
    fn test_to_post_image_classified_by_image_list() {
        let item = json!({
            "aweme_id": "111",
            "images": [
                { "url_list": ["https://cdn.example.com/a.jpg"] },
                { "url_list": ["https://cdn.example.com/b.jpg"] }
            ]
        });
        let post = DouyinAdapter.to_post(&item).unwrap();

        assert_eq!(post.post_type, PostType::Image);
        assert_eq!(post.image_urls.len(), 2);
        assert!(post.video_urls.is_empty());
    }

    #[test]
    fn test_to_post_defaults_for_missing_optionals() {
        let item = json!({
            "aweme_id": "222",
            "video": { "play_addr": { "url_list": ["https://cdn.example.com/v"] } }
        });
        let post = DouyinAdapter.to_post(&item).unwrap();

        assert_eq!(post.title, "");
        assert_eq!(post.author_id, "");
        assert_eq!(post.like_count, 0);
        assert_eq!(post.published_at, 0);
        assert_eq!(post.cover_url, None);
    }

    #[test]
    fn test_to_post_unclassifiable_item_is_error() {
        let item = json!({ "aweme_id": "333" });
        assert!(matches!(
            DouyinAdapter.to_post(&item),
            Err(AdapterError::UnknownPostType { .. })
        ));
    }

    #[test]
    fn test_to_post_missing_id_is_error() {
        let item = json!({ "desc": "no id here" });
        assert!(matches!(
            DouyinAdapter.to_post(&item),
            Err(AdapterError::MissingField { .. })
        ));
    }

    #[test]
    fn test_to_post_search_wrapper() {
        let wrapped = json!({ "aweme_info": video_item() });
        let post = DouyinAdapter.to_post(&wrapped).unwrap();
        assert_eq!(post.platform_item_id, "7499608775142608186");
    }

    #[test]
    fn test_to_comment_top_level() {
        let raw = json!({
            "cid": "c1",
            "text": "first!",
            "digg_count": 3,
            "reply_comment_total": 2,
            "create_time": 1714000100,
            "reply_id": "0",
            "user": {
                "uid": "u1",
                "nickname": "alice",
                "avatar_thumb": { "url_list": ["https://cdn.example.com/ava.jpg"] }
            }
        });
        let comment = DouyinAdapter.to_comment(&raw, 7).unwrap();

        assert_eq!(comment.post_id, 7);
        assert_eq!(comment.parent_platform_comment_id, None);
        assert_eq!(comment.reply_count, 2);
        assert_eq!(
            comment.author_avatar.as_deref(),
            Some("https://cdn.example.com/ava.jpg")
        );
        assert!(!comment.is_reply());
    }

    #[test]
    fn test_to_comment_reply_to_top_level() {
        let raw = json!({
            "cid": "c2",
            "text": "agreed",
            "reply_id": "c1",
            "reply_to_reply_id": "0"
        });
        let comment = DouyinAdapter.to_comment(&raw, 7).unwrap();
        assert_eq!(comment.parent_platform_comment_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_to_comment_nested_reply_keeps_immediate_parent() {
        // c3 replies to c2, which lives in c1's thread: parent must be c2
        let raw = json!({
            "cid": "c3",
            "text": "nested",
            "reply_id": "c1",
            "reply_to_reply_id": "c2"
        });
        let comment = DouyinAdapter.to_comment(&raw, 7).unwrap();
        assert_eq!(comment.parent_platform_comment_id.as_deref(), Some("c2"));
    }

    #[test]
    fn test_to_comment_numeric_ids() {
        let raw = json!({ "cid": 98765, "reply_id": 0 });
        let comment = DouyinAdapter.to_comment(&raw, 7).unwrap();
        assert_eq!(comment.platform_comment_id, "98765");
        assert_eq!(comment.parent_platform_comment_id, None);
    }

    #[test]
    fn test_parse_comment_page() {
        let op = PageOp::Comments {
            item_id: "123".to_string(),
        };
        let data = json!({
            "comments": [{ "cid": "c1" }, { "cid": "c2" }],
            "cursor": 20,
            "has_more": 1
        });

        let page = DouyinAdapter.parse_page(&op, None, &data).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("20"));
        assert!(page.has_more);
    }

    #[test]
    fn test_parse_page_exhausted() {
        let op = PageOp::Comments {
            item_id: "123".to_string(),
        };
        let data = json!({ "comments": [], "cursor": 40, "has_more": 0 });

        let page = DouyinAdapter.parse_page(&op, None, &data).unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_page_request_cursor_param_names() {
        let comments = DouyinAdapter.page_request(
            &PageOp::Comments {
                item_id: "123".to_string(),
            },
            Some("40"),
            20,
        );
        assert!(comments
            .params
            .contains(&("cursor".to_string(), "40".to_string())));

        let search = DouyinAdapter.page_request(
            &PageOp::Search {
                keyword: "coffee".to_string(),
            },
            None,
            20,
        );
        // Search uses offset, starting at 0
        assert!(search
            .params
            .contains(&("offset".to_string(), "0".to_string())));
    }

    #[test]
    fn test_extract_post_detail() {
        let data = json!({ "aweme_detail": { "aweme_id": "1" } });
        let detail = DouyinAdapter.extract_post_detail(&data).unwrap();
        assert_eq!(detail["aweme_id"], "1");

        let bare = json!({ "aweme_id": "2" });
        assert!(DouyinAdapter.extract_post_detail(&bare).is_ok());

        let empty = json!({});
        assert!(DouyinAdapter.extract_post_detail(&empty).is_err());
    }
}
