//! Platform adapters: pure mapping from platform-shaped gateway payloads to
//! the normalized domain model.
//!
//! Each platform ships its own field names, cursor shapes and count formats;
//! everything platform-specific lives behind `PlatformAdapter` so the rest
//! of the pipeline never probes raw JSON. Adapters do no I/O and never
//! mutate their inputs. A malformed item is a per-item error the caller
//! skips, not a batch failure.

pub mod douyin;
pub mod kuaishou;
pub mod xiaohongshu;

use crate::api::GatewayRequest;
use serde_json::Value;
use trendlens_core::{AdapterError, Comment, Platform, Post};

/// Which paginated listing is being fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOp {
    Search { keyword: String },
    Comments { item_id: String },
    Replies { item_id: String, comment_id: String },
}

impl PageOp {
    /// Short label for logs and retry operation names.
    pub fn label(&self) -> &'static str {
        match self {
            PageOp::Search { .. } => "search",
            PageOp::Comments { .. } => "comments",
            PageOp::Replies { .. } => "replies",
        }
    }
}

/// One page worth of raw items plus normalized continuation state.
///
/// `next_cursor` is opaque outside the adapter that produced it and must be
/// carried back verbatim on the next call.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub items: Vec<Value>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Map one raw item to a normalized post.
    fn to_post(&self, raw: &Value) -> Result<Post, AdapterError>;

    /// Map one raw comment. `post_id` is the owning post's storage id.
    fn to_comment(&self, raw: &Value, post_id: i64) -> Result<Comment, AdapterError>;

    fn post_detail_request(&self, item_id: &str) -> GatewayRequest;

    fn page_request(&self, op: &PageOp, cursor: Option<&str>, page_size: u32) -> GatewayRequest;

    /// Locate the single post object inside a detail response.
    fn extract_post_detail(&self, data: &Value) -> Result<Value, AdapterError>;

    /// Extract this page's items and continuation state. `prev_cursor` is
    /// the cursor the page was fetched with; platforms whose next token is
    /// derived rather than echoed (composite page counters) need it.
    fn parse_page(
        &self,
        op: &PageOp,
        prev_cursor: Option<&str>,
        data: &Value,
    ) -> Result<RawPage, AdapterError>;
}

/// Tagged dispatch: one static adapter per platform, no runtime probing.
pub fn adapter_for(platform: Platform) -> &'static dyn PlatformAdapter {
    match platform {
        Platform::Douyin => &douyin::DouyinAdapter,
        Platform::Xiaohongshu => &xiaohongshu::XiaohongshuAdapter,
        Platform::Kuaishou => &kuaishou::KuaishouAdapter,
    }
}

// ---- shared field probing helpers ----
//
// Gateway payloads are inconsistently typed: ids arrive as strings or
// numbers, counters as numbers or display strings, flags as bools or 0/1.
// These helpers normalize with defined defaults instead of failing.

/// String field, tolerating numeric values. `None` when absent/null.
pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Required identity field; absence makes the whole item malformed.
pub(crate) fn required_str(value: &Value, key: &str) -> Result<String, AdapterError> {
    str_field(value, key).ok_or_else(|| AdapterError::MissingField {
        field: key.to_string(),
    })
}

/// First present counter among `keys`, leniently parsed; 0 when none match.
pub(crate) fn count_field(value: &Value, keys: &[&str]) -> i64 {
    for key in keys {
        if let Some(v) = value.get(*key) {
            return lenient_count(v);
        }
    }
    0
}

/// Parse a count that may be a number or a display string like "1.2万".
pub(crate) fn lenient_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            if let Some(stripped) = s.strip_suffix('万') {
                (stripped.parse::<f64>().unwrap_or(0.0) * 10_000.0) as i64
            } else if let Some(stripped) = s.strip_suffix('亿') {
                (stripped.parse::<f64>().unwrap_or(0.0) * 100_000_000.0) as i64
            } else {
                s.parse::<i64>().unwrap_or(0)
            }
        }
        _ => 0,
    }
}

/// `has_more` arrives as bool or 0/1.
pub(crate) fn bool_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

/// Unix timestamp in seconds, accepting second- or millisecond-scale values
/// and numeric strings.
pub(crate) fn unix_seconds(value: Option<&Value>) -> i64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    };
    // Millisecond timestamps are 13 digits well past any plausible
    // second-scale publish time
    if raw > 1_000_000_000_000 {
        raw / 1000
    } else {
        raw
    }
}

/// Items list under `key`, or an empty batch when the field is absent.
pub(crate) fn item_array(data: &Value, key: &str) -> Vec<Value> {
    data.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
