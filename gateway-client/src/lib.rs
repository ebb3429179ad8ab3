pub mod adapters;
pub mod api;
pub mod metrics;
pub mod pagination;
pub mod rate_limiter;
pub mod retry;

pub use adapters::{adapter_for, PageOp, PlatformAdapter, RawPage};
pub use api::{Envelope, GatewayApiClient, GatewayRequest};
pub use pagination::{GatewayPageSource, PageSource, PageState, Paginator};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{RetryConfig, RetryExecutor, RetryStrategy};
