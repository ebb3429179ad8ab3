use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platforms reachable through the scraping gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Douyin,
    Xiaohongshu,
    Kuaishou,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Douyin => "douyin",
            Platform::Xiaohongshu => "xiaohongshu",
            Platform::Kuaishou => "kuaishou",
        }
    }

    pub fn all() -> &'static [Platform] {
        &[Platform::Douyin, Platform::Xiaohongshu, Platform::Kuaishou]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "douyin" => Ok(Platform::Douyin),
            "xiaohongshu" | "xhs" => Ok(Platform::Xiaohongshu),
            "kuaishou" => Ok(Platform::Kuaishou),
            other => Err(CoreError::InvalidInput {
                message: format!("unknown platform: {}", other),
            }),
        }
    }
}

/// Kind of content an item carries, classified only from explicit payload
/// signals (video block vs image list), never from URL extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Video,
    Image,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Video => "video",
            PostType::Image => "image",
        }
    }
}

impl FromStr for PostType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(PostType::Video),
            "image" => Ok(PostType::Image),
            other => Err(CoreError::InvalidInput {
                message: format!("unknown post type: {}", other),
            }),
        }
    }
}

/// A normalized post/note from any platform.
///
/// Identity is the natural key `(platform, platform_item_id)`; counters and
/// content are refreshed on re-ingestion of the same key. The untouched
/// upstream payload rides along in `raw_payload` for audit and replay.
#[derive(Debug, Clone)]
pub struct Post {
    pub platform: Platform,
    pub platform_item_id: String,
    pub title: String,
    pub body: Option<String>,
    pub post_type: PostType,
    pub author_id: String,
    pub author_name: String,
    pub play_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub cover_url: Option<String>,
    /// Playable URLs, best candidate first.
    pub video_urls: Vec<String>,
    pub image_urls: Vec<String>,
    /// Unix seconds; 0 when the payload omits it.
    pub published_at: i64,
    pub raw_payload: serde_json::Value,
}

/// A normalized comment, top-level or reply.
///
/// The parent relationship is carried two ways at once:
/// `parent_platform_comment_id` is the platform-native id and is known as
/// soon as the comment is fetched; `parent_id` is the local storage
/// reference and stays `None` until the tree resolver fills it in.
#[derive(Debug, Clone)]
pub struct Comment {
    pub platform: Platform,
    pub platform_comment_id: String,
    /// Storage id of the owning post.
    pub post_id: i64,
    pub author_id: String,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub content: String,
    pub like_count: i64,
    pub reply_count: i64,
    /// Unix seconds; 0 when the payload omits it.
    pub published_at: i64,
    /// `None` for top-level comments.
    pub parent_platform_comment_id: Option<String>,
    /// Resolved local parent reference; `None` until the parent row exists.
    pub parent_id: Option<i64>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_platform_comment_id.is_some()
    }
}
