//! Xiaohongshu (xhs) adapter.
//!
//! Notes carry interaction counts as display strings ("1.2万") and
//! millisecond timestamps. Comment pages use the gateway's opaque `cursor`
//! string; search pages have no server cursor at all, so continuation is a
//! `{page, search_id}` pair the adapter packs into one opaque JSON cursor so
//! the controller never learns the difference. Sub-comments name their
//! immediate parent in `target_comment`.

use super::{
    bool_flag, count_field, item_array, required_str, str_field, unix_seconds, PageOp,
    PlatformAdapter, RawPage,
};
use crate::api::GatewayRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trendlens_core::{AdapterError, Comment, Platform, Post, PostType};

/// Composite continuation state for search pagination.
///
/// Round-trips through an opaque JSON string; only this adapter ever looks
/// inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCursor {
    pub page: u32,
    #[serde(default)]
    pub search_id: String,
}

impl SearchCursor {
    pub fn encode(&self) -> String {
        // Two scalar fields; serialization cannot fail
        serde_json::to_string(self).expect("search cursor serializes")
    }

    pub fn decode(raw: &str) -> Result<Self, AdapterError> {
        serde_json::from_str(raw).map_err(|e| AdapterError::CursorDecode {
            details: format!("bad xiaohongshu search cursor: {}", e),
        })
    }

    fn from_opt(raw: Option<&str>) -> Result<Self, AdapterError> {
        match raw {
            Some(raw) => Self::decode(raw),
            None => Ok(Self {
                page: 1,
                search_id: String::new(),
            }),
        }
    }
}

pub struct XiaohongshuAdapter;

impl XiaohongshuAdapter {
    /// Best stream first: h264 renditions lead (first listed is the master),
    /// h265 trails for players that can use it.
    fn select_video_urls(video: &Value) -> Vec<String> {
        let stream = video
            .get("media")
            .and_then(|m| m.get("stream"))
            .cloned()
            .unwrap_or(Value::Null);

        let mut urls = Vec::new();
        for codec in ["h264", "h265"] {
            if let Some(renditions) = stream.get(codec).and_then(Value::as_array) {
                for rendition in renditions {
                    if let Some(url) = str_field(rendition, "master_url") {
                        if !urls.contains(&url) {
                            urls.push(url);
                        }
                    }
                }
            }
        }
        urls
    }
}

impl PlatformAdapter for XiaohongshuAdapter {
    fn platform(&self) -> Platform {
        Platform::Xiaohongshu
    }

    fn to_post(&self, raw: &Value) -> Result<Post, AdapterError> {
        // Search hits wrap the note in note_card
        let raw = raw.get("note_card").unwrap_or(raw);

        let platform_item_id = match str_field(raw, "note_id") {
            Some(id) => id,
            None => required_str(raw, "id")?,
        };
        let interact = raw.get("interact_info").cloned().unwrap_or(Value::Null);
        let user = raw.get("user").cloned().unwrap_or(Value::Null);

        let declared_video = raw.get("type").and_then(Value::as_str) == Some("video");
        let video = raw.get("video").filter(|v| !v.is_null());
        let image_list = raw.get("image_list").and_then(Value::as_array);

        let (post_type, video_urls, image_urls) = if declared_video || video.is_some() {
            let video_urls = video.map(Self::select_video_urls).unwrap_or_default();
            (PostType::Video, video_urls, Vec::new())
        } else if let Some(images) = image_list {
            let image_urls = images
                .iter()
                .filter_map(|img| {
                    str_field(img, "url_default").or_else(|| str_field(img, "url"))
                })
                .collect();
            (PostType::Image, Vec::new(), image_urls)
        } else {
            return Err(AdapterError::UnknownPostType {
                item_id: platform_item_id,
            });
        };

        let cover_url = raw
            .get("image_list")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .and_then(|img| str_field(img, "url_default").or_else(|| str_field(img, "url")));

        let body = str_field(raw, "desc");

        Ok(Post {
            platform: Platform::Xiaohongshu,
            platform_item_id,
            title: str_field(raw, "title").unwrap_or_default(),
            body,
            post_type,
            author_id: str_field(&user, "user_id").unwrap_or_default(),
            author_name: str_field(&user, "nickname").unwrap_or_default(),
            // xhs exposes no play counter on notes
            play_count: count_field(&interact, &["view_count"]),
            like_count: count_field(&interact, &["liked_count", "like_count"]),
            comment_count: count_field(&interact, &["comment_count"]),
            share_count: count_field(&interact, &["share_count", "shared_count"]),
            cover_url,
            video_urls,
            image_urls,
            published_at: unix_seconds(raw.get("time")),
            raw_payload: raw.clone(),
        })
    }

    fn to_comment(&self, raw: &Value, post_id: i64) -> Result<Comment, AdapterError> {
        let platform_comment_id = required_str(raw, "id")?;
        let user = raw.get("user_info").cloned().unwrap_or(Value::Null);

        // Sub-comments name their immediate parent; top-level comments have
        // no target_comment at all
        let parent_platform_comment_id = raw
            .get("target_comment")
            .and_then(|t| str_field(t, "id"));

        Ok(Comment {
            platform: Platform::Xiaohongshu,
            platform_comment_id,
            post_id,
            author_id: str_field(&user, "user_id").unwrap_or_default(),
            author_name: str_field(&user, "nickname").unwrap_or_default(),
            author_avatar: str_field(&user, "image"),
            content: str_field(raw, "content").unwrap_or_default(),
            like_count: count_field(raw, &["like_count"]),
            reply_count: count_field(raw, &["sub_comment_count"]),
            published_at: unix_seconds(raw.get("create_time")),
            parent_platform_comment_id,
            parent_id: None,
        })
    }

    fn post_detail_request(&self, item_id: &str) -> GatewayRequest {
        GatewayRequest::get("/api/v1/xhs/web/get_note_info").with_param("note_id", item_id)
    }

    fn page_request(&self, op: &PageOp, cursor: Option<&str>, page_size: u32) -> GatewayRequest {
        match op {
            PageOp::Search { keyword } => {
                // Decode failure would mean a cursor this adapter never
                // produced; fall back to page 1 rather than loop on it
                let state = SearchCursor::from_opt(cursor).unwrap_or(SearchCursor {
                    page: 1,
                    search_id: String::new(),
                });
                let mut request = GatewayRequest::get("/api/v1/xhs/web/search_notes")
                    .with_param("keyword", keyword)
                    .with_param("page", state.page.to_string())
                    .with_param("page_size", page_size.to_string());
                if !state.search_id.is_empty() {
                    request = request.with_param("search_id", state.search_id);
                }
                request
            }
            PageOp::Comments { item_id } => {
                GatewayRequest::get("/api/v1/xhs/web/get_note_comments")
                    .with_param("note_id", item_id)
                    .with_param("cursor", cursor.unwrap_or(""))
            }
            PageOp::Replies {
                item_id,
                comment_id,
            } => GatewayRequest::get("/api/v1/xhs/web/get_note_sub_comments")
                .with_param("note_id", item_id)
                .with_param("root_comment_id", comment_id)
                .with_param("cursor", cursor.unwrap_or(""))
                .with_param("num", page_size.to_string()),
        }
    }

    fn extract_post_detail(&self, data: &Value) -> Result<Value, AdapterError> {
        if let Some(note) = data.get("note") {
            if !note.is_null() {
                return Ok(note.clone());
            }
        }
        if data.get("note_id").is_some() || data.get("id").is_some() {
            return Ok(data.clone());
        }
        Err(AdapterError::MissingField {
            field: "note".to_string(),
        })
    }

    fn parse_page(
        &self,
        op: &PageOp,
        prev_cursor: Option<&str>,
        data: &Value,
    ) -> Result<RawPage, AdapterError> {
        match op {
            PageOp::Search { .. } => {
                let items = item_array(data, "items");
                let has_more = bool_flag(data.get("has_more"));

                // Derive the next composite cursor: bump the page, keep the
                // search session sticky across pages
                let prev = SearchCursor::from_opt(prev_cursor)?;
                let search_id = str_field(data, "search_id").unwrap_or(prev.search_id);
                let next = SearchCursor {
                    page: prev.page + 1,
                    search_id,
                };

                Ok(RawPage {
                    items,
                    next_cursor: Some(next.encode()),
                    has_more,
                })
            }
            PageOp::Comments { .. } | PageOp::Replies { .. } => Ok(RawPage {
                items: item_array(data, "comments"),
                next_cursor: str_field(data, "cursor"),
                has_more: bool_flag(data.get("has_more")),
            }),
        }
    }
}
