//! Ingestion orchestration.
//!
//! One `IngestionService` drives the whole pipeline: pagination against the
//! gateway, per-item adaptation, comment tree resolution and idempotent
//! persistence. Each "fetch all" invocation owns its paginator and resolver;
//! concurrent invocations share nothing but the database pool. The periodic
//! polling loop revisits configured watch targets and can be shut down
//! between pages, never mid-call.

pub mod resolver;

pub use resolver::{CommentTreeResolver, ParentLink};

use database::{Database, StoredPost};
use gateway_client::{
    adapter_for, GatewayApiClient, GatewayPageSource, PageOp, PageSource, Paginator, RetryConfig,
    RetryExecutor,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use trendlens_core::{AppConfig, CoreError, ErrorReporter, Platform};

/// Outcome summary for one ingestion invocation (or one polling cycle).
#[derive(Debug, Clone, Default)]
pub struct IngestStats {
    pub posts_upserted: usize,
    pub comments_upserted: usize,
    /// Malformed items logged and skipped.
    pub items_skipped: usize,
    pub pages_fetched: u32,
    /// Children persisted before their parent was known.
    pub links_deferred: usize,
    /// Deferred links back-filled within the run.
    pub links_resolved: usize,
    /// Children whose parent never appeared this run.
    pub links_unresolved: usize,
}

impl IngestStats {
    pub fn merge(&mut self, other: &IngestStats) {
        self.posts_upserted += other.posts_upserted;
        self.comments_upserted += other.comments_upserted;
        self.items_skipped += other.items_skipped;
        self.pages_fetched += other.pages_fetched;
        self.links_deferred += other.links_deferred;
        self.links_resolved += other.links_resolved;
        self.links_unresolved += other.links_unresolved;
    }

    /// True when nothing was skipped and every link resolved.
    pub fn is_clean(&self) -> bool {
        self.items_skipped == 0 && self.links_unresolved == 0
    }
}

/// Create the shutdown signal pair for [`IngestionService::with_shutdown`].
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

pub struct IngestionService {
    client: Arc<GatewayApiClient>,
    database: Arc<Database>,
    config: AppConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl IngestionService {
    pub fn new(client: Arc<GatewayApiClient>, database: Arc<Database>, config: AppConfig) -> Self {
        Self {
            client,
            database,
            config,
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Fetch one post by its platform id, persist it, then its whole
    /// comment tree.
    pub async fn ingest_post(
        &self,
        platform: Platform,
        item_id: &str,
    ) -> Result<IngestStats, CoreError> {
        info!("Ingesting {} item {}", platform, item_id);
        let adapter = adapter_for(platform);
        let retry = RetryExecutor::new(RetryConfig::gateway());

        let request = adapter.post_detail_request(item_id);
        let client = &self.client;
        let envelope = retry
            .execute("post detail", || {
                let request = request.clone();
                async move {
                    let envelope = client.call(&request).await?;
                    if !envelope.ok {
                        return Err(CoreError::Gateway(envelope.business_error()));
                    }
                    Ok(envelope)
                }
            })
            .await?;

        let raw = adapter.extract_post_detail(&envelope.data)?;
        let post = adapter.to_post(&raw)?;
        let stored = self
            .database
            .upsert_posts(&[post])
            .await?
            .pop()
            .ok_or_else(|| CoreError::Internal {
                message: "post upsert returned no row".to_string(),
            })?;

        let mut stats = IngestStats {
            posts_upserted: 1,
            ..Default::default()
        };
        let tree = self.ingest_comment_tree(platform, &stored).await?;
        stats.merge(&tree);
        Ok(stats)
    }

    /// Fetch the complete comment tree of a stored post: every top-level
    /// comment page, then the reply pages of every comment that advertises
    /// replies, resolving parent links along the way.
    pub async fn ingest_comment_tree(
        &self,
        platform: Platform,
        post: &StoredPost,
    ) -> Result<IngestStats, CoreError> {
        let mut stats = IngestStats::default();
        let mut resolver = CommentTreeResolver::new();

        let result = self
            .fetch_comment_tree(platform, post, &mut resolver, &mut stats)
            .await;

        // Whatever happened above, link up everything that became linkable
        // and report the rest; partial ingestion stays on disk
        if let Err(link_error) = self.apply_resolvable_links(&mut resolver, &mut stats).await {
            warn!(
                "Deferred link pass for {} failed: {}",
                post.platform_item_id, link_error
            );
        }
        stats.links_unresolved = resolver.unresolved_count();
        if stats.links_unresolved > 0 {
            warn!(
                "{} comments on {} {} still missing parents after this run",
                stats.links_unresolved, platform, post.platform_item_id
            );
            resolver.report_unresolved();
        }

        result?;
        Ok(stats)
    }

    async fn fetch_comment_tree(
        &self,
        platform: Platform,
        post: &StoredPost,
        resolver: &mut CommentTreeResolver,
        stats: &mut IngestStats,
    ) -> Result<(), CoreError> {
        // Top-level comments; roots with replies queue their own listings
        let mut reply_roots = Vec::new();
        let op = PageOp::Comments {
            item_id: post.platform_item_id.clone(),
        };
        let source = GatewayPageSource::new(
            self.client.as_ref(),
            platform,
            op,
            self.config.pagination.page_size,
        );
        let mut paginator = Paginator::new(source, self.config.pagination.clone());
        self.drain_comment_listing(
            &mut paginator,
            platform,
            post,
            resolver,
            stats,
            Some(&mut reply_roots),
        )
        .await?;

        // Reply listings return the whole thread flat under the root, so
        // one level of sub-pagination covers arbitrarily deep threads
        for comment_id in reply_roots {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping before remaining reply listings");
                break;
            }
            let op = PageOp::Replies {
                item_id: post.platform_item_id.clone(),
                comment_id,
            };
            let source = GatewayPageSource::new(
                self.client.as_ref(),
                platform,
                op,
                self.config.pagination.page_size,
            );
            let mut paginator = Paginator::new(source, self.config.pagination.clone());
            self.drain_comment_listing(&mut paginator, platform, post, resolver, stats, None)
                .await?;
        }

        Ok(())
    }

    /// Drain one paginated comment listing into the store, resolving parent
    /// links as pages land. Generic over the page source so scripted
    /// sources can drive it in tests.
    pub async fn drain_comment_listing<S: PageSource>(
        &self,
        paginator: &mut Paginator<S>,
        platform: Platform,
        post: &StoredPost,
        resolver: &mut CommentTreeResolver,
        stats: &mut IngestStats,
        mut reply_roots: Option<&mut Vec<String>>,
    ) -> Result<(), CoreError> {
        let adapter = adapter_for(platform);

        loop {
            // Cancellation happens between pages, never mid-call
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping pagination for {}", platform);
                break;
            }

            let page = match paginator.next_page().await? {
                Some(page) => page,
                None => break,
            };
            stats.pages_fetched += 1;

            let mut batch = Vec::with_capacity(page.items.len());
            for item in &page.items {
                match adapter.to_comment(item, post.id) {
                    Ok(comment) => batch.push(comment),
                    Err(error) => {
                        // One malformed item never aborts the batch
                        warn!(
                            "Skipping malformed comment on {} {}: {}",
                            platform, post.platform_item_id, error
                        );
                        stats.items_skipped += 1;
                    }
                }
            }
            if batch.is_empty() {
                continue;
            }

            let pending_before = resolver.unresolved_count();
            let prepared = resolver.prepare(batch);
            stats.links_deferred += resolver.unresolved_count().saturating_sub(pending_before);

            let stored = self.database.upsert_comments(&prepared).await?;
            resolver.record(&stored);
            stats.comments_upserted += stored.len();

            if let Some(roots) = reply_roots.as_deref_mut() {
                for row in &stored {
                    if row.reply_count > 0 && row.parent_platform_comment_id.is_none() {
                        roots.push(row.platform_comment_id.clone());
                    }
                }
            }

            // Parents that landed on this page may unblock earlier children
            self.apply_resolvable_links(resolver, stats).await?;
        }

        Ok(())
    }

    async fn apply_resolvable_links(
        &self,
        resolver: &mut CommentTreeResolver,
        stats: &mut IngestStats,
    ) -> Result<(), CoreError> {
        for link in resolver.drain_resolvable() {
            let updated = self
                .database
                .update_comment_parent_link(
                    link.platform,
                    &link.platform_comment_id,
                    link.parent_id,
                    link.post_id,
                )
                .await?;

            match updated {
                Some(_) => stats.links_resolved += 1,
                None => warn!(
                    "Deferred link target {} missing from store",
                    link.platform_comment_id
                ),
            }
        }
        Ok(())
    }

    /// Search a keyword, persist every hit, and (optionally) ingest each
    /// hit's comment tree.
    pub async fn ingest_search(
        &self,
        platform: Platform,
        keyword: &str,
        include_comments: bool,
    ) -> Result<IngestStats, CoreError> {
        info!("Ingesting {} search '{}'", platform, keyword);
        let mut stats = IngestStats::default();
        let adapter = adapter_for(platform);

        let op = PageOp::Search {
            keyword: keyword.to_string(),
        };
        let source = GatewayPageSource::new(
            self.client.as_ref(),
            platform,
            op,
            self.config.pagination.page_size,
        );
        let mut paginator = Paginator::new(source, self.config.pagination.clone());

        loop {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping search pagination");
                break;
            }

            let page = match paginator.next_page().await? {
                Some(page) => page,
                None => break,
            };
            stats.pages_fetched += 1;

            let mut batch = Vec::with_capacity(page.items.len());
            for item in &page.items {
                match adapter.to_post(item) {
                    Ok(post) => batch.push(post),
                    Err(error) => {
                        warn!("Skipping malformed search hit on {}: {}", platform, error);
                        stats.items_skipped += 1;
                    }
                }
            }
            if batch.is_empty() {
                continue;
            }

            let stored = self.database.upsert_posts(&batch).await?;
            stats.posts_upserted += stored.len();

            if include_comments {
                for post in &stored {
                    if self.shutdown_requested() {
                        break;
                    }
                    // Each comment tree is its own invocation; one failing
                    // doesn't take the search down with it
                    match self.ingest_comment_tree(platform, post).await {
                        Ok(tree) => stats.merge(&tree),
                        Err(error) => warn!(
                            "Comment tree for {} {} failed: {}",
                            platform, post.platform_item_id, error
                        ),
                    }
                }
            }
        }

        Ok(stats)
    }

    /// One pass over every configured watch target. Failed invocations are
    /// reported and skipped; the rest of the cycle continues.
    pub async fn run_once(&self) -> IngestStats {
        let cycle_id = uuid::Uuid::new_v4();
        info!(
            "Starting ingestion cycle {} ({} targets)",
            cycle_id,
            self.config.watch.len()
        );

        let reporter = ErrorReporter::new();
        let mut totals = IngestStats::default();

        for target in &self.config.watch {
            if self.shutdown_requested() {
                info!("Shutdown requested, cutting cycle {} short", cycle_id);
                break;
            }

            let result = if let Some(item_id) = &target.item_id {
                self.ingest_post(target.platform, item_id).await
            } else if let Some(keyword) = &target.keyword {
                self.ingest_search(target.platform, keyword, target.include_comments)
                    .await
            } else {
                continue;
            };

            match result {
                Ok(stats) => totals.merge(&stats),
                Err(error) => reporter.report_error(&error),
            }
        }

        info!(
            "Ingestion cycle {} complete: {} posts, {} comments, {} pages, {} skipped, {} links unresolved",
            cycle_id,
            totals.posts_upserted,
            totals.comments_upserted,
            totals.pages_fetched,
            totals.items_skipped,
            totals.links_unresolved
        );
        totals
    }

    /// Periodic polling loop; returns when shutdown is signaled.
    pub async fn start(&self) -> Result<(), CoreError> {
        info!(
            "Starting ingestion service, polling every {} minutes",
            self.config.polling_interval_minutes
        );

        loop {
            if self.shutdown_requested() {
                break;
            }

            self.run_once().await;

            match self.shutdown.clone() {
                Some(mut rx) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.polling_interval()) => {}
                        _ = rx.changed() => {}
                    }
                }
                None => tokio::time::sleep(self.config.polling_interval()).await,
            }
        }

        info!("Ingestion service stopped");
        Ok(())
    }
}
