use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use trendlens_core::{CoreError, GatewayApiError};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Circuit breaker failure threshold
    pub failure_threshold: u32,
    /// Circuit breaker recovery timeout (in seconds)
    pub recovery_timeout_s: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000, // 1 second
            max_delay_ms: 30000, // 30 seconds
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,     // 10% jitter
            failure_threshold: 5,   // Circuit breaker after 5 consecutive failures
            recovery_timeout_s: 60, // Try recovery after 1 minute
        }
    }
}

impl RetryConfig {
    /// Retry profile tuned for the scraping gateway, which throttles hard
    /// and rate-limits bursts.
    pub fn gateway() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000, // Start with 2 seconds
            max_delay_ms: 60000, // Max 1 minute delay
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,      // 20% jitter to prevent thundering herd
            failure_threshold: 3,    // More aggressive circuit breaking for API
            recovery_timeout_s: 120, // 2 minute recovery window
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerState {
    Closed,   // Normal operation
    Open,     // Blocking requests
    HalfOpen, // Testing recovery
}

/// Circuit breaker for preventing cascading failures
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    config: RetryConfig,
}

impl CircuitBreaker {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            config,
        }
    }

    /// Check if a request should be allowed
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => {
                if let Some(last_failure) = self.last_failure_time {
                    let recovery_duration = Duration::from_secs(self.config.recovery_timeout_s);
                    if last_failure.elapsed() >= recovery_duration {
                        debug!("Circuit breaker transitioning to half-open for recovery test");
                        self.state = CircuitBreakerState::HalfOpen;
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            CircuitBreakerState::HalfOpen => true,
        }
    }

    /// Record a successful request
    pub fn record_success(&mut self) {
        match self.state {
            CircuitBreakerState::HalfOpen => {
                info!("Circuit breaker recovery successful, returning to closed state");
                self.state = CircuitBreakerState::Closed;
                self.failure_count = 0;
                self.last_failure_time = None;
            }
            _ => {
                // Reset failure count on success
                self.failure_count = 0;
            }
        }
    }

    /// Record a failed request
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        match self.state {
            CircuitBreakerState::Closed => {
                if self.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker opening due to {} consecutive failures",
                        self.failure_count
                    );
                    self.state = CircuitBreakerState::Open;
                }
            }
            CircuitBreakerState::HalfOpen => {
                warn!("Circuit breaker recovery failed, returning to open state");
                self.state = CircuitBreakerState::Open;
            }
            CircuitBreakerState::Open => {
                // Already open, just update failure time
            }
        }
    }

    pub fn get_state(&self) -> CircuitBreakerState {
        self.state.clone()
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after a specific delay (for rate limits with retry-after)
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::Gateway(gateway_error) => match gateway_error {
            // Rate limits are retried once after the gateway's own delay
            GatewayApiError::RateLimitExceeded { retry_after } => {
                RetryStrategy::RetryWithDelay(Duration::from_secs(*retry_after))
            }
            // Transport-level failures are usually transient
            GatewayApiError::RequestTimeout => RetryStrategy::Retry,
            GatewayApiError::Transport { .. } => RetryStrategy::Retry,
            GatewayApiError::ServerError { .. } => RetryStrategy::Retry,
            GatewayApiError::EndpointUnavailable { .. } => RetryStrategy::Retry,
            // A garbled body can be a hiccup at the gateway
            GatewayApiError::InvalidResponse { .. } => RetryStrategy::Retry,
            // Business-level failures are permanent: bad credentials or bad
            // parameters won't get better by asking again
            GatewayApiError::AuthenticationFailed { .. } => RetryStrategy::NoRetry,
            GatewayApiError::Forbidden { .. } => RetryStrategy::NoRetry,
            GatewayApiError::Business { .. } => RetryStrategy::NoRetry,
            GatewayApiError::ItemNotFound { .. } => RetryStrategy::NoRetry,
        },
        // Network errors might be transient
        CoreError::Network(reqwest_error) => {
            if reqwest_error.is_timeout() || reqwest_error.is_connect() {
                RetryStrategy::Retry
            } else {
                RetryStrategy::NoRetry
            }
        }
        CoreError::Timeout { .. } => RetryStrategy::Retry,
        // Malformed items, config problems and the rest are not worth retrying
        _ => RetryStrategy::NoRetry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = Duration::from_millis(config.base_delay_ms);
    let max_delay = Duration::from_millis(config.max_delay_ms);

    // Calculate exponential backoff
    let exponential_delay = if attempt == 0 {
        base_delay
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(config.max_delay_ms))
    };

    // Add jitter to prevent thundering herd
    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    // Ensure we don't exceed max delay
    final_delay.min(max_delay)
}

/// Retry metrics for monitoring
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_retries: u64,
    pub circuit_breaker_trips: u64,
    pub average_retry_delay_ms: f64,
}

/// Retry executor that wraps operations with retry logic
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    circuit_breaker: Arc<Mutex<CircuitBreaker>>,
    metrics: Arc<Mutex<RetryMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        let circuit_breaker = Arc::new(Mutex::new(CircuitBreaker::new(config.clone())));
        let metrics = Arc::new(Mutex::new(RetryMetrics::default()));

        Self {
            config,
            circuit_breaker,
            metrics,
        }
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        // Check circuit breaker first
        {
            let mut breaker = self.circuit_breaker.lock().unwrap();
            if !breaker.allow_request() {
                let mut metrics = self.metrics.lock().unwrap();
                metrics.circuit_breaker_trips += 1;
                drop(metrics);
                drop(breaker);

                warn!(
                    "Circuit breaker is open, blocking request for {}",
                    operation_name
                );
                return Err(CoreError::Internal {
                    message: "Circuit breaker is open".to_string(),
                });
            }
        }

        let mut last_error: Option<CoreError> = None;
        let mut total_delay_ms = 0u64;

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let start_time = Instant::now();
            match operation().await {
                Ok(result) => {
                    // Success - record in circuit breaker and metrics
                    {
                        let mut breaker = self.circuit_breaker.lock().unwrap();
                        breaker.record_success();
                    }

                    if attempt > 0 {
                        let mut metrics = self.metrics.lock().unwrap();
                        metrics.total_retries += attempt as u64;
                        metrics.successful_retries += 1;
                        metrics.average_retry_delay_ms = (metrics.average_retry_delay_ms
                            * (metrics.successful_retries - 1) as f64
                            + total_delay_ms as f64)
                            / metrics.successful_retries as f64;

                        info!(
                            "Operation {} succeeded after {} retries (total delay: {}ms)",
                            operation_name, attempt, total_delay_ms
                        );
                    }

                    return Ok(result);
                }
                Err(error) => {
                    let elapsed = start_time.elapsed();

                    debug!(
                        "Attempt {} failed for {} after {:?}: {}",
                        attempt + 1,
                        operation_name,
                        elapsed,
                        error
                    );

                    // Determine if we should retry
                    let strategy = get_retry_strategy(&error);
                    let should_retry = attempt + 1 < self.config.max_attempts;

                    match strategy {
                        RetryStrategy::NoRetry => {
                            debug!(
                                "Not retrying {} due to error type: {}",
                                operation_name, error
                            );
                            last_error = Some(error);
                            break;
                        }
                        RetryStrategy::Retry if should_retry => {
                            let delay = calculate_delay(attempt, &self.config);
                            total_delay_ms += delay.as_millis() as u64;

                            info!(
                                "Retrying {} in {:?} due to: {}",
                                operation_name, delay, error
                            );

                            last_error = Some(error);
                            sleep(delay).await;
                        }
                        RetryStrategy::RetryWithDelay(delay) if should_retry => {
                            total_delay_ms += delay.as_millis() as u64;

                            info!(
                                "Retrying {} after specified delay of {:?} due to: {}",
                                operation_name, delay, error
                            );

                            last_error = Some(error);
                            sleep(delay).await;
                        }
                        _ => {
                            // Max attempts reached or no retry strategy
                            if should_retry {
                                debug!("Max retry attempts reached for {}", operation_name);
                            }
                            last_error = Some(error);
                            break;
                        }
                    }
                }
            }
        }

        // All retries failed - record failure in circuit breaker and metrics
        {
            let mut breaker = self.circuit_breaker.lock().unwrap();
            breaker.record_failure();
        }

        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.failed_retries += 1;
        }

        error!(
            "Operation {} failed after {} attempts with total delay of {}ms",
            operation_name, self.config.max_attempts, total_delay_ms
        );

        // Surface the typed error so callers can tell a rate limit from a
        // dead endpoint
        Err(last_error.unwrap_or_else(|| CoreError::Internal {
            message: "Unknown error during retry execution".to_string(),
        }))
    }

    /// Get current retry metrics
    pub fn get_metrics(&self) -> RetryMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Get current circuit breaker state
    pub fn get_circuit_breaker_state(&self) -> CircuitBreakerState {
        self.circuit_breaker.lock().unwrap().get_state()
    }

    /// Reset metrics (useful for testing or periodic cleanup)
    pub fn reset_metrics(&self) {
        let mut metrics = self.metrics.lock().unwrap();
        *metrics = RetryMetrics::default();
    }
}
