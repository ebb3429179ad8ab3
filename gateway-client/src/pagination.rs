//! Pagination controller.
//!
//! Drives repeated gateway calls for one logical "fetch all" operation,
//! carrying the platform's opaque continuation cursor between calls. Pages
//! are pulled lazily one at a time (consumers process each batch before the
//! next fetch), strictly in continuation order, and never restarted: a new
//! invocation means a new `Paginator`.

use crate::adapters::{adapter_for, PageOp, PlatformAdapter, RawPage};
use crate::api::GatewayApiClient;
use crate::retry::{RetryConfig, RetryExecutor};
use async_trait::async_trait;
use tokio::time::sleep;
use trendlens_core::{CoreError, PaginationConfig, Platform};
use tracing::{debug, warn};

/// Source of raw pages for one paginated listing.
///
/// The production implementation hits the gateway; tests script one.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page at `cursor` (`None` means the first page).
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<RawPage, CoreError>;

    /// Label for logs and retry bookkeeping.
    fn describe(&self) -> String;
}

/// `PageSource` backed by the gateway client and a platform adapter.
pub struct GatewayPageSource<'a> {
    client: &'a GatewayApiClient,
    adapter: &'static dyn PlatformAdapter,
    op: PageOp,
    page_size: u32,
}

impl<'a> GatewayPageSource<'a> {
    pub fn new(client: &'a GatewayApiClient, platform: Platform, op: PageOp, page_size: u32) -> Self {
        Self {
            client,
            adapter: adapter_for(platform),
            op,
            page_size,
        }
    }
}

#[async_trait]
impl PageSource for GatewayPageSource<'_> {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<RawPage, CoreError> {
        let request = self.adapter.page_request(&self.op, cursor, self.page_size);
        let envelope = self.client.call(&request).await?;

        if !envelope.ok {
            // A decodable business failure becomes a typed error here so the
            // retry layer can classify it (rate limit vs permanent)
            return Err(CoreError::Gateway(envelope.business_error()));
        }

        let page = self.adapter.parse_page(&self.op, cursor, &envelope.data)?;
        Ok(page)
    }

    fn describe(&self) -> String {
        format!("{} {}", self.adapter.platform(), self.op.label())
    }
}

/// Pagination state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Start,
    HasMore,
    Exhausted,
    Aborted,
}

pub struct Paginator<S: PageSource> {
    source: S,
    config: PaginationConfig,
    retry: RetryExecutor,
    state: PageState,
    cursor: Option<String>,
    pages_fetched: u32,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, config: PaginationConfig) -> Self {
        Self {
            source,
            config,
            retry: RetryExecutor::new(RetryConfig::gateway()),
            state: PageState::Start,
            cursor: None,
            pages_fetched: 0,
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(retry_config);
        self
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Pull the next page.
    ///
    /// Returns `Ok(None)` once the listing is exhausted, the page cap was
    /// hit, or a previous call aborted. Transport failures are retried with
    /// backoff; when retries exhaust (or the gateway reports a permanent
    /// business failure) the error propagates and the paginator stays
    /// `Aborted`; everything already handed out remains valid.
    pub async fn next_page(&mut self) -> Result<Option<RawPage>, CoreError> {
        match self.state {
            PageState::Exhausted | PageState::Aborted => return Ok(None),
            PageState::Start | PageState::HasMore => {}
        }

        if self.pages_fetched >= self.config.max_pages {
            warn!(
                "Page cap of {} reached for {}, aborting pagination",
                self.config.max_pages,
                self.source.describe()
            );
            self.state = PageState::Aborted;
            return Ok(None);
        }

        // The between-page pause is part of the upstream contract, not a
        // politeness: aggressive pagination reliably gets throttled
        if self.pages_fetched > 0 {
            sleep(self.config.page_delay()).await;
        }

        let operation_name = self.source.describe();
        let cursor = self.cursor.clone();
        let source = &self.source;
        let result = self
            .retry
            .execute(&operation_name, || {
                let cursor = cursor.clone();
                async move { source.fetch_page(cursor.as_deref()).await }
            })
            .await;

        let page = match result {
            Ok(page) => page,
            Err(error) => {
                warn!(
                    "Pagination for {} aborted on page {}: {}",
                    operation_name,
                    self.pages_fetched + 1,
                    error
                );
                self.state = PageState::Aborted;
                return Err(error);
            }
        };

        self.pages_fetched += 1;
        debug!(
            "Fetched page {} of {} ({} items, has_more={})",
            self.pages_fetched,
            operation_name,
            page.items.len(),
            page.has_more
        );

        // Anti-infinite-loop guard: upstream claims more pages but handed
        // back the token we just used
        if page.has_more && page.next_cursor.is_some() && page.next_cursor == self.cursor {
            warn!(
                "Continuation cursor for {} did not advance ({:?}), aborting pagination",
                operation_name, self.cursor
            );
            self.state = PageState::Aborted;
            return Ok(Some(page));
        }

        if page.has_more && page.next_cursor.is_some() {
            self.cursor = page.next_cursor.clone();
            self.state = PageState::HasMore;
        } else {
            if page.has_more {
                debug!(
                    "{} reported has_more without a cursor, treating as exhausted",
                    operation_name
                );
            }
            self.state = PageState::Exhausted;
        }

        Ok(Some(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use trendlens_core::GatewayApiError;

    /// Scripted page source: pops pre-baked results and records the cursor
    /// each fetch arrived with.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<RawPage, CoreError>>>,
        cursors_seen: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<RawPage, CoreError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                cursors_seen: Mutex::new(Vec::new()),
            }
        }

        fn fetch_count(&self) -> usize {
            self.cursors_seen.lock().unwrap().len()
        }

        fn cursors(&self) -> Vec<Option<String>> {
            self.cursors_seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for &ScriptedSource {
        async fn fetch_page(&self, cursor: Option<&str>) -> Result<RawPage, CoreError> {
            self.cursors_seen
                .lock()
                .unwrap()
                .push(cursor.map(str::to_string));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RawPage::default()))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn page(items: u32, cursor: &str, has_more: bool) -> RawPage {
        RawPage {
            items: (0..items).map(|i| json!({ "id": i })).collect(),
            next_cursor: Some(cursor.to_string()),
            has_more,
        }
    }

    fn test_config() -> PaginationConfig {
        PaginationConfig {
            max_pages: 10,
            page_delay_ms: 0,
            page_size: 20,
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_paginates_until_exhausted() {
        let source = ScriptedSource::new(vec![
            Ok(page(2, "p2", true)),
            Ok(page(1, "p3", false)),
        ]);
        let mut paginator = Paginator::new(&source, test_config());

        let first = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(paginator.state(), PageState::HasMore);

        let second = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(paginator.state(), PageState::Exhausted);

        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_cursor_carried_verbatim() {
        let source = ScriptedSource::new(vec![
            Ok(page(1, "QWJjRGVm", true)),
            Ok(page(1, "end", false)),
        ]);
        let mut paginator = Paginator::new(&source, test_config());

        paginator.next_page().await.unwrap();
        paginator.next_page().await.unwrap();

        assert_eq!(
            source.cursors(),
            vec![None, Some("QWJjRGVm".to_string())]
        );
    }

    #[tokio::test]
    async fn test_repeated_cursor_aborts_within_one_iteration() {
        // Page 2 hands back the same cursor it was fetched with while still
        // claiming has_more: the controller must not fetch page 3
        let source = ScriptedSource::new(vec![
            Ok(page(1, "p2", true)),
            Ok(page(1, "p2", true)),
            Ok(page(1, "p4", true)), // must never be fetched
        ]);
        let mut paginator = Paginator::new(&source, test_config());

        // Both pages are still delivered so their items get processed
        assert!(paginator.next_page().await.unwrap().is_some());
        assert!(paginator.next_page().await.unwrap().is_some());
        assert_eq!(paginator.state(), PageState::Aborted);

        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_page_cap_forces_abort() {
        let source = ScriptedSource::new(
            (0..10)
                .map(|i| Ok(page(1, &format!("p{}", i + 2), true)))
                .collect(),
        );
        let config = PaginationConfig {
            max_pages: 3,
            page_delay_ms: 0,
            page_size: 20,
        };
        let mut paginator = Paginator::new(&source, config);

        let mut pages = 0;
        while let Some(_page) = paginator.next_page().await.unwrap() {
            pages += 1;
        }

        assert_eq!(pages, 3);
        assert_eq!(paginator.state(), PageState::Aborted);
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_transient_error_retried_then_succeeds() {
        let source = ScriptedSource::new(vec![
            Err(CoreError::Gateway(GatewayApiError::ServerError {
                status_code: 502,
            })),
            Ok(page(1, "p2", false)),
        ]);
        let mut paginator =
            Paginator::new(&source, test_config()).with_retry_config(fast_retry());

        let first = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(first.items.len(), 1);
        // One failed attempt plus the retry
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(paginator.state(), PageState::Exhausted);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_and_propagate() {
        let source = ScriptedSource::new(vec![
            Err(CoreError::Gateway(GatewayApiError::RequestTimeout)),
            Err(CoreError::Gateway(GatewayApiError::RequestTimeout)),
        ]);
        let mut paginator =
            Paginator::new(&source, test_config()).with_retry_config(fast_retry());

        let result = paginator.next_page().await;
        assert!(matches!(
            result,
            Err(CoreError::Gateway(GatewayApiError::RequestTimeout))
        ));
        assert_eq!(source.fetch_count(), 2); // bounded attempts
        assert_eq!(paginator.state(), PageState::Aborted);

        // Aborted stays aborted
        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_business_error_aborts_without_retry() {
        let source = ScriptedSource::new(vec![Err(CoreError::Gateway(
            GatewayApiError::Business {
                code: 4001,
                message: "invalid params".to_string(),
            },
        ))]);
        let mut paginator =
            Paginator::new(&source, test_config()).with_retry_config(fast_retry());

        assert!(paginator.next_page().await.is_err());
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(paginator.state(), PageState::Aborted);
    }

    #[tokio::test]
    async fn test_has_more_without_cursor_exhausts() {
        let source = ScriptedSource::new(vec![Ok(RawPage {
            items: vec![json!({ "id": 1 })],
            next_cursor: None,
            has_more: true,
        })]);
        let mut paginator = Paginator::new(&source, test_config());

        assert!(paginator.next_page().await.unwrap().is_some());
        assert_eq!(paginator.state(), PageState::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_between_page_delay_is_applied() {
        let source = ScriptedSource::new(vec![
            Ok(page(1, "p2", true)),
            Ok(page(1, "p3", false)),
        ]);
        let config = PaginationConfig {
            max_pages: 10,
            page_delay_ms: 500,
            page_size: 20,
        };
        let mut paginator = Paginator::new(&source, config);

        let start = tokio::time::Instant::now();
        paginator.next_page().await.unwrap();
        // No delay before the first page
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);

        paginator.next_page().await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(500));
    }
}
