use crate::metrics::{MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use trendlens_core::{CoreError, GatewayApiError, GatewayConfig};

/// One logical call against the scraping gateway.
///
/// The cursor/page/token parameter name differs per platform and operation;
/// platform adapters build these, the client just executes them.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl GatewayRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Label used for metrics bucketing.
    pub fn operation(&self) -> &str {
        &self.path
    }
}

/// Decoded gateway response.
///
/// The gateway wraps every platform payload in `{ code, data }` and may
/// signal a business failure inside an HTTP 200; `ok` is the normalized
/// verdict (`code == 200 || code == 0`). A business failure is data, not an
/// error; callers branch on `ok`.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub status: u16,
    pub ok: bool,
    pub code: i64,
    pub message: Option<String>,
    pub data: Value,
}

impl Envelope {
    /// Typed view of a `!ok` envelope, for callers that decide to abort.
    pub fn business_error(&self) -> GatewayApiError {
        GatewayApiError::Business {
            code: self.code,
            message: self
                .message
                .clone()
                .unwrap_or_else(|| "unspecified gateway error".to_string()),
        }
    }
}

#[derive(Debug)]
pub struct GatewayApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    base_url: String,
    api_key: String,
}

impl GatewayApiClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let rate_config = RateLimitConfig::scrape_gateway();
        let rate_limiter = Arc::new(RateLimiter::new(rate_config));
        let metrics = Arc::new(MetricsCollector::new());

        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            rate_limiter,
            metrics,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// Execute a single request. No retries happen here; retrying is the
    /// pagination controller's concern.
    pub async fn call(&self, request: &GatewayRequest) -> Result<Envelope, CoreError> {
        let url = format!("{}{}", self.base_url, request.path);
        let start_time = Instant::now();
        let mut success = false;
        let mut status_code = None;
        let mut error_type = None;
        let mut rate_limited = false;

        // Acquire rate limit permit
        let _permit = self.rate_limiter.acquire_permit().await;
        debug!(
            "Acquired rate limit permit for {} {}",
            request.method, request.path
        );

        let mut request_builder = self
            .http_client
            .request(request.method.clone(), &url)
            .bearer_auth(&self.api_key);

        if !request.params.is_empty() {
            request_builder = request_builder.query(&request.params);
        }

        info!("Calling gateway: {} {}", request.method, request.path);
        let response = match request_builder.send().await {
            Ok(response) => {
                status_code = Some(response.status().as_u16());

                if response.status().is_success() {
                    debug!(
                        "Request successful: {} {}",
                        response.status(),
                        request.path
                    );
                } else {
                    error!(
                        "Request failed with status: {} for {}",
                        response.status(),
                        request.path
                    );

                    if response.status().as_u16() == 429 {
                        rate_limited = true;
                        error_type = Some("rate_limited".to_string());
                        self.record(request, status_code, start_time, false, rate_limited, error_type)
                            .await;

                        // Extract retry-after header if present
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        warn!("Rate limited, retry after {} seconds", retry_after);
                        return Err(CoreError::Gateway(GatewayApiError::RateLimitExceeded {
                            retry_after,
                        }));
                    } else if response.status().as_u16() == 401 {
                        error_type = Some("unauthorized".to_string());
                        self.record(request, status_code, start_time, false, rate_limited, error_type)
                            .await;
                        return Err(CoreError::Gateway(GatewayApiError::AuthenticationFailed {
                            reason: "gateway rejected the API key".to_string(),
                        }));
                    } else if response.status().as_u16() == 403 {
                        error_type = Some("forbidden".to_string());
                        self.record(request, status_code, start_time, false, rate_limited, error_type)
                            .await;
                        return Err(CoreError::Gateway(GatewayApiError::Forbidden {
                            resource: request.path.clone(),
                        }));
                    } else if response.status().as_u16() == 404 {
                        error_type = Some("not_found".to_string());
                        self.record(request, status_code, start_time, false, rate_limited, error_type)
                            .await;
                        return Err(CoreError::Gateway(GatewayApiError::EndpointUnavailable {
                            endpoint: request.path.clone(),
                        }));
                    } else if response.status().is_server_error() {
                        error_type = Some("server_error".to_string());
                        let status = response.status().as_u16();
                        self.record(request, status_code, start_time, false, rate_limited, error_type)
                            .await;
                        return Err(CoreError::Gateway(GatewayApiError::ServerError {
                            status_code: status,
                        }));
                    }
                }

                response
            }
            Err(e) => {
                error!(
                    "Network error for {} {}: {}",
                    request.method, request.path, e
                );
                error_type = Some("network_error".to_string());
                self.record(request, status_code, start_time, false, rate_limited, error_type)
                    .await;

                if e.is_timeout() {
                    return Err(CoreError::Gateway(GatewayApiError::RequestTimeout));
                } else if e.is_connect() {
                    return Err(CoreError::Gateway(GatewayApiError::Transport {
                        details: e.to_string(),
                    }));
                } else {
                    return Err(CoreError::Network(e));
                }
            }
        };

        let body: Value = response.json().await.map_err(|e| {
            error!("Failed to decode gateway response: {}", e);
            CoreError::Gateway(GatewayApiError::InvalidResponse {
                details: format!("undecodable body for {}", request.path),
            })
        })?;

        let code = body.get("code").and_then(Value::as_i64).unwrap_or(-1);
        let ok = code == 200 || code == 0;
        let message = body
            .get("message")
            .or_else(|| body.get("msg"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let data = body.get("data").cloned().unwrap_or(Value::Null);

        if ok {
            success = true;
        } else {
            warn!(
                "Gateway signaled business failure for {}: code={} message={:?}",
                request.path, code, message
            );
            error_type = Some("business_error".to_string());
        }

        self.record(request, status_code, start_time, success, rate_limited, error_type)
            .await;

        Ok(Envelope {
            status: status_code.unwrap_or(0),
            ok,
            code,
            message,
            data,
        })
    }

    async fn record(
        &self,
        request: &GatewayRequest,
        status_code: Option<u16>,
        start_time: Instant,
        success: bool,
        rate_limited: bool,
        error_type: Option<String>,
    ) {
        let request_metrics = RequestMetrics {
            operation: request.operation().to_string(),
            method: request.method.to_string(),
            status_code,
            response_time: start_time.elapsed(),
            success,
            rate_limited,
            error_type,
        };
        self.metrics.record_request(request_metrics).await;
    }

    pub async fn get_metrics(&self) -> crate::metrics::ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn get_rate_limit_status(&self) -> crate::rate_limiter::RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }

    pub async fn reset_metrics(&self) {
        self.metrics.reset_metrics().await;
    }
}
