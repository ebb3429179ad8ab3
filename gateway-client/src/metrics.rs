use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub average_response_time: Duration,
    pub last_request_time: Option<SystemTime>,
    pub requests_by_operation: HashMap<String, OperationMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_response_time: Duration,
    pub min_response_time: Duration,
    pub max_response_time: Duration,
}

/// Snapshot of a single completed (or failed) gateway call.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub operation: String,
    pub method: String,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub success: bool,
    pub rate_limited: bool,
    pub error_type: Option<String>,
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            rate_limited_requests: 0,
            average_response_time: Duration::from_millis(0),
            last_request_time: None,
            requests_by_operation: HashMap::new(),
        }
    }
}

impl OperationMetrics {
    fn new() -> Self {
        Self {
            request_count: 0,
            success_count: 0,
            error_count: 0,
            total_response_time: Duration::from_millis(0),
            min_response_time: Duration::from_secs(u64::MAX),
            max_response_time: Duration::from_millis(0),
        }
    }

    fn update(&mut self, metrics: &RequestMetrics) {
        self.request_count += 1;
        self.total_response_time += metrics.response_time;

        if metrics.response_time < self.min_response_time {
            self.min_response_time = metrics.response_time;
        }
        if metrics.response_time > self.max_response_time {
            self.max_response_time = metrics.response_time;
        }

        if metrics.success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
    }

    pub fn average_response_time(&self) -> Duration {
        if self.request_count == 0 {
            Duration::from_millis(0)
        } else {
            self.total_response_time / self.request_count as u32
        }
    }
}

/// In-memory per-operation request accounting for the gateway client.
#[derive(Debug)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ApiMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(ApiMetrics::default())),
        }
    }

    pub async fn record_request(&self, request: RequestMetrics) {
        let mut metrics = self.metrics.write().await;

        metrics.total_requests += 1;
        if request.success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }
        if request.rate_limited {
            metrics.rate_limited_requests += 1;
        }

        // Running average over all requests
        let total = metrics.total_requests;
        let previous_total =
            metrics.average_response_time * (total.saturating_sub(1)) as u32;
        metrics.average_response_time = (previous_total + request.response_time) / total as u32;

        metrics.last_request_time = Some(SystemTime::now());

        metrics
            .requests_by_operation
            .entry(request.operation.clone())
            .or_insert_with(OperationMetrics::new)
            .update(&request);
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset_metrics(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = ApiMetrics::default();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(operation: &str, success: bool, millis: u64) -> RequestMetrics {
        RequestMetrics {
            operation: operation.to_string(),
            method: "GET".to_string(),
            status_code: Some(if success { 200 } else { 500 }),
            response_time: Duration::from_millis(millis),
            success,
            rate_limited: false,
            error_type: if success {
                None
            } else {
                Some("server_error".to_string())
            },
        }
    }

    #[tokio::test]
    async fn test_record_and_aggregate() {
        let collector = MetricsCollector::new();

        collector
            .record_request(sample_request("/comments", true, 100))
            .await;
        collector
            .record_request(sample_request("/comments", false, 300))
            .await;
        collector
            .record_request(sample_request("/search", true, 200))
            .await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.successful_requests, 2);
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.average_response_time, Duration::from_millis(200));

        let comments = &metrics.requests_by_operation["/comments"];
        assert_eq!(comments.request_count, 2);
        assert_eq!(comments.success_count, 1);
        assert_eq!(comments.error_count, 1);
        assert_eq!(comments.min_response_time, Duration::from_millis(100));
        assert_eq!(comments.max_response_time, Duration::from_millis(300));
        assert_eq!(comments.average_response_time(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_rate_limited_counter() {
        let collector = MetricsCollector::new();

        let mut request = sample_request("/comments", false, 50);
        request.rate_limited = true;
        collector.record_request(request).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.rate_limited_requests, 1);
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();
        collector
            .record_request(sample_request("/search", true, 10))
            .await;
        collector.reset_metrics().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 0);
        assert!(metrics.requests_by_operation.is_empty());
    }
}
