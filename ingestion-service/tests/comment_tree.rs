//! End-to-end comment tree scenarios: scripted gateway pages driven through
//! the real paginator, resolver and SQLite store.

use async_trait::async_trait;
use database::Database;
use gateway_client::{GatewayApiClient, PageSource, PageState, Paginator, RawPage};
use ingestion_service::{CommentTreeResolver, IngestStats, IngestionService};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use trendlens_core::{
    AppConfig, CoreError, GatewayConfig, PaginationConfig, Platform, Post, PostType,
};

struct ScriptedSource {
    script: Mutex<VecDeque<RawPage>>,
    fetches: Mutex<usize>,
}

impl ScriptedSource {
    fn new(pages: Vec<RawPage>) -> Self {
        Self {
            script: Mutex::new(pages.into()),
            fetches: Mutex::new(0),
        }
    }

    fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl PageSource for &ScriptedSource {
    async fn fetch_page(&self, _cursor: Option<&str>) -> Result<RawPage, CoreError> {
        *self.fetches.lock().unwrap() += 1;
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    fn describe(&self) -> String {
        "scripted comments".to_string()
    }
}

fn raw_page(items: Vec<Value>, cursor: &str, has_more: bool) -> RawPage {
    RawPage {
        items,
        next_cursor: Some(cursor.to_string()),
        has_more,
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        gateway: GatewayConfig {
            base_url: "http://localhost:1".to_string(),
            api_key: "test".to_string(),
            timeout_seconds: 1,
        },
        database_url: String::new(),
        polling_interval_minutes: 30,
        pagination: PaginationConfig {
            max_pages: 10,
            page_delay_ms: 0,
            page_size: 20,
        },
        watch: Vec::new(),
    }
}

async fn setup() -> (IngestionService, Arc<Database>, database::StoredPost) {
    let db_path = std::env::temp_dir().join(format!("test_tree_{}.db", uuid::Uuid::new_v4()));
    let db_url = format!("sqlite://{}", db_path.display());
    let database = Arc::new(Database::connect(&db_url).await.unwrap());
    database.run_migrations().await.unwrap();

    let post = Post {
        platform: Platform::Douyin,
        platform_item_id: "7499608775142608186".to_string(),
        title: "scenario post".to_string(),
        body: None,
        post_type: PostType::Video,
        author_id: "u1".to_string(),
        author_name: "author".to_string(),
        play_count: 0,
        like_count: 100,
        comment_count: 2,
        share_count: 0,
        cover_url: None,
        video_urls: vec!["https://cdn.example.com/v.mp4".to_string()],
        image_urls: Vec::new(),
        published_at: 1_714_000_000,
        raw_payload: json!({}),
    };
    let stored = database.upsert_posts(&[post]).await.unwrap().remove(0);

    let config = test_config();
    let client = Arc::new(GatewayApiClient::new(&config.gateway));
    let service = IngestionService::new(client, database.clone(), config);

    (service, database, stored)
}

/// Literal scenario from the design notes: page 1 returns c1 with cursor
/// "p2", page 2 returns c2 (a reply to c1) with the same non-advancing
/// cursor while still claiming more. Both comments must be persisted with
/// c2 linked to c1, and the controller must abort instead of fetching
/// page 2 forever.
#[tokio::test]
async fn test_non_advancing_cursor_scenario() {
    let (service, database, post) = setup().await;

    let source = ScriptedSource::new(vec![
        raw_page(vec![json!({ "cid": "c1", "reply_id": "0" })], "p2", true),
        raw_page(vec![json!({ "cid": "c2", "reply_id": "c1" })], "p2", true),
        raw_page(vec![json!({ "cid": "c3", "reply_id": "0" })], "p3", true),
    ]);
    let mut paginator = Paginator::new(&source, service_pagination());
    let mut resolver = CommentTreeResolver::new();
    let mut stats = IngestStats::default();

    service
        .drain_comment_listing(
            &mut paginator,
            Platform::Douyin,
            &post,
            &mut resolver,
            &mut stats,
            None,
        )
        .await
        .unwrap();

    // Aborted after the repeated cursor, without a third fetch
    assert_eq!(paginator.state(), PageState::Aborted);
    assert_eq!(source.fetch_count(), 2);
    assert_eq!(stats.pages_fetched, 2);

    // Both comments persisted, reply linked to its parent's storage row
    let comments = database.get_comments_for_post(post.id).await.unwrap();
    assert_eq!(comments.len(), 2);
    let c1 = comments
        .iter()
        .find(|c| c.platform_comment_id == "c1")
        .unwrap();
    let c2 = comments
        .iter()
        .find(|c| c.platform_comment_id == "c2")
        .unwrap();
    assert_eq!(c2.parent_id, Some(c1.id));
    assert_eq!(c2.parent_platform_comment_id.as_deref(), Some("c1"));
}

/// Ingesting the reply page before the page carrying its parent must end in
/// the same linkage as the natural order.
#[tokio::test]
async fn test_parent_resolution_is_order_independent() {
    // Replies first
    let (service, database, post) = setup().await;
    let source = ScriptedSource::new(vec![
        raw_page(
            vec![json!({ "cid": "c2", "reply_id": "c1", "reply_to_reply_id": "0" })],
            "p2",
            true,
        ),
        raw_page(vec![json!({ "cid": "c1", "reply_id": "0" })], "end", false),
    ]);
    let mut paginator = Paginator::new(&source, service_pagination());
    let mut resolver = CommentTreeResolver::new();
    let mut stats = IngestStats::default();

    service
        .drain_comment_listing(
            &mut paginator,
            Platform::Douyin,
            &post,
            &mut resolver,
            &mut stats,
            None,
        )
        .await
        .unwrap();

    // c2 was persisted unlinked first, then back-filled once c1 landed
    assert_eq!(stats.links_deferred, 1);
    assert_eq!(stats.links_resolved, 1);
    assert_eq!(resolver.unresolved_count(), 0);

    let comments = database.get_comments_for_post(post.id).await.unwrap();
    let c1 = comments
        .iter()
        .find(|c| c.platform_comment_id == "c1")
        .unwrap();
    let c2 = comments
        .iter()
        .find(|c| c.platform_comment_id == "c2")
        .unwrap();
    assert_eq!(c2.parent_id, Some(c1.id));
}

/// A reply-to-a-reply links to the immediate parent reply, never to the
/// thread's top-level comment.
#[tokio::test]
async fn test_multi_level_thread_keeps_immediate_parent() {
    let (service, database, post) = setup().await;

    let source = ScriptedSource::new(vec![raw_page(
        vec![
            json!({ "cid": "c1", "reply_id": "0" }),
            json!({ "cid": "c2", "reply_id": "c1", "reply_to_reply_id": "0" }),
            json!({ "cid": "c3", "reply_id": "c1", "reply_to_reply_id": "c2" }),
        ],
        "end",
        false,
    )]);
    let mut paginator = Paginator::new(&source, service_pagination());
    let mut resolver = CommentTreeResolver::new();
    let mut stats = IngestStats::default();

    service
        .drain_comment_listing(
            &mut paginator,
            Platform::Douyin,
            &post,
            &mut resolver,
            &mut stats,
            None,
        )
        .await
        .unwrap();

    let comments = database.get_comments_for_post(post.id).await.unwrap();
    let by_id = |native: &str| {
        comments
            .iter()
            .find(|c| c.platform_comment_id == native)
            .unwrap()
    };

    assert_eq!(by_id("c2").parent_id, Some(by_id("c1").id));
    // Immediate parent, not the thread root
    assert_eq!(by_id("c3").parent_id, Some(by_id("c2").id));
}

/// A parent living on a page that never arrives leaves the child persisted
/// but unlinked: reportable, not an error.
#[tokio::test]
async fn test_parent_on_missing_page_is_nonfatal() {
    let (service, database, post) = setup().await;

    let source = ScriptedSource::new(vec![raw_page(
        vec![json!({ "cid": "c9", "reply_id": "far_away_parent" })],
        "end",
        false,
    )]);
    let mut paginator = Paginator::new(&source, service_pagination());
    let mut resolver = CommentTreeResolver::new();
    let mut stats = IngestStats::default();

    service
        .drain_comment_listing(
            &mut paginator,
            Platform::Douyin,
            &post,
            &mut resolver,
            &mut stats,
            None,
        )
        .await
        .unwrap();

    assert_eq!(resolver.unresolved_count(), 1);

    let comments = database.get_comments_for_post(post.id).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].parent_id, None);
    assert_eq!(
        comments[0].parent_platform_comment_id.as_deref(),
        Some("far_away_parent")
    );
}

/// Malformed items are skipped without aborting the batch.
#[tokio::test]
async fn test_malformed_item_skipped_batch_continues() {
    let (service, database, post) = setup().await;

    let source = ScriptedSource::new(vec![raw_page(
        vec![
            json!({ "cid": "good1", "reply_id": "0" }),
            json!({ "text": "no cid at all" }),
            json!({ "cid": "good2", "reply_id": "0" }),
        ],
        "end",
        false,
    )]);
    let mut paginator = Paginator::new(&source, service_pagination());
    let mut resolver = CommentTreeResolver::new();
    let mut stats = IngestStats::default();

    service
        .drain_comment_listing(
            &mut paginator,
            Platform::Douyin,
            &post,
            &mut resolver,
            &mut stats,
            None,
        )
        .await
        .unwrap();

    assert_eq!(stats.items_skipped, 1);
    assert_eq!(stats.comments_upserted, 2);

    let comments = database.get_comments_for_post(post.id).await.unwrap();
    assert_eq!(comments.len(), 2);
}

fn service_pagination() -> PaginationConfig {
    PaginationConfig {
        max_pages: 10,
        page_delay_ms: 0,
        page_size: 20,
    }
}
