use std::time::Duration;
use trendlens_core::{
    AdapterError, ConfigError, CoreError, DatabaseError, ErrorExt, ErrorReporter, GatewayApiError,
};

#[test]
fn test_error_codes() {
    let gateway_error = CoreError::Gateway(GatewayApiError::RequestTimeout);
    assert_eq!(gateway_error.error_code(), "GATEWAY_API");

    let db_error = CoreError::Database(DatabaseError::DatabaseLocked);
    assert_eq!(db_error.error_code(), "DATABASE");

    let adapter_error = CoreError::Adapter(AdapterError::MissingField {
        field: "aweme_id".to_string(),
    });
    assert_eq!(adapter_error.error_code(), "ADAPTER");

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "api_key".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");
}

#[test]
fn test_retryable_errors() {
    let retryable_error =
        CoreError::Gateway(GatewayApiError::RateLimitExceeded { retry_after: 60 });
    assert!(retryable_error.is_retryable());

    let transport_error = CoreError::Gateway(GatewayApiError::Transport {
        details: "connection reset".to_string(),
    });
    assert!(transport_error.is_retryable());

    // A malformed item stays malformed: skipping, not retrying, is the remedy.
    let adapter_error = CoreError::Adapter(AdapterError::MissingField {
        field: "cid".to_string(),
    });
    assert!(!adapter_error.is_retryable());

    let non_retryable_error = CoreError::Config(ConfigError::MissingField {
        field: "api_key".to_string(),
    });
    assert!(!non_retryable_error.is_retryable());
}

#[test]
fn test_business_errors_not_retryable() {
    let business_error = CoreError::Gateway(GatewayApiError::Business {
        code: 4001,
        message: "invalid params".to_string(),
    });
    assert!(!business_error.is_retryable());

    let auth_error = CoreError::Gateway(GatewayApiError::AuthenticationFailed {
        reason: "bad key".to_string(),
    });
    assert!(!auth_error.is_retryable());
}

#[test]
fn test_retry_after() {
    let rate_limit_error =
        CoreError::Gateway(GatewayApiError::RateLimitExceeded { retry_after: 60 });
    assert_eq!(
        rate_limit_error.retry_after(),
        Some(Duration::from_secs(60))
    );

    let timeout_error = CoreError::Timeout { seconds: 30 };
    assert_eq!(timeout_error.retry_after(), Some(Duration::from_secs(30)));
}

#[test]
fn test_user_friendly_messages() {
    let gateway_error = CoreError::Gateway(GatewayApiError::AuthenticationFailed {
        reason: "expired".to_string(),
    });
    let message = gateway_error.user_friendly_message();
    assert!(!message.is_empty());
    assert!(message.contains("API key"));

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "api_key".to_string(),
    });
    let message = config_error.user_friendly_message();
    assert!(!message.is_empty());
    assert!(message.contains("api_key"));
}

#[test]
fn test_error_reporter() {
    let reporter = ErrorReporter::new()
        .with_error_reporting(true)
        .with_warning_reporting(true);
    let error = CoreError::Gateway(GatewayApiError::RequestTimeout);

    // This test just ensures the methods don't panic
    reporter.report_error(&error);
    reporter.report_warning(&error);
}
