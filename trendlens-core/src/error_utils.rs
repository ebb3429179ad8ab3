use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Gateway(e) => {
                error!("Gateway API error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Adapter(e) => {
                error!("Adapter error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Gateway(e) => e.is_retryable(),
            CoreError::Database(e) => e.is_retryable(),
            CoreError::Adapter(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::Timeout { .. } => true,
            CoreError::Io(_) => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Gateway(GatewayApiError::RateLimitExceeded { retry_after }) => {
                Some(Duration::from_secs(*retry_after))
            }
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            _ if self.is_retryable() => Some(Duration::from_secs(5)), // Default retry delay
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Gateway(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Adapter(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { .. } => {
                "Invalid input provided. Please check your input and try again.".to_string()
            }
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. Please try again.".to_string()
            }
            CoreError::NotFound { resource } => format!("Could not find: {}", resource),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Gateway(_) => "GATEWAY_API".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Adapter(_) => "ADAPTER".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::NotFound { .. } => "NOT_FOUND".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for GatewayApiError {
    fn log_error(&self) -> &Self {
        error!("GatewayApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("GatewayApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            GatewayApiError::RateLimitExceeded { .. } => true,
            GatewayApiError::RequestTimeout => true,
            GatewayApiError::Transport { .. } => true,
            GatewayApiError::ServerError { status_code } => *status_code >= 500,
            GatewayApiError::EndpointUnavailable { .. } => true,
            GatewayApiError::InvalidResponse { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(30)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            GatewayApiError::AuthenticationFailed { .. } => {
                "Gateway authentication failed. Please check your API key.".to_string()
            }
            GatewayApiError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            GatewayApiError::Forbidden { resource } => format!(
                "Access denied to {}. You may not have permission to view this content.",
                resource
            ),
            GatewayApiError::Business { code, message } => {
                format!("Gateway reported error {}: {}", code, message)
            }
            GatewayApiError::ItemNotFound { item_id } => {
                format!("Item '{}' not found or has been removed.", item_id)
            }
            GatewayApiError::RequestTimeout => {
                "Request to the gateway timed out. Please try again.".to_string()
            }
            GatewayApiError::Transport { .. } => {
                "Could not reach the gateway. Please check your connection.".to_string()
            }
            _ => "Gateway API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            GatewayApiError::AuthenticationFailed { .. } => "GATEWAY_AUTH_FAILED".to_string(),
            GatewayApiError::RateLimitExceeded { .. } => "GATEWAY_RATE_LIMIT".to_string(),
            GatewayApiError::Forbidden { .. } => "GATEWAY_FORBIDDEN".to_string(),
            GatewayApiError::Business { .. } => "GATEWAY_BUSINESS_ERROR".to_string(),
            GatewayApiError::ItemNotFound { .. } => "GATEWAY_ITEM_NOT_FOUND".to_string(),
            GatewayApiError::RequestTimeout => "GATEWAY_TIMEOUT".to_string(),
            GatewayApiError::Transport { .. } => "GATEWAY_TRANSPORT".to_string(),
            GatewayApiError::InvalidResponse { .. } => "GATEWAY_INVALID_RESPONSE".to_string(),
            GatewayApiError::ServerError { .. } => "GATEWAY_SERVER_ERROR".to_string(),
            GatewayApiError::EndpointUnavailable { .. } => {
                "GATEWAY_ENDPOINT_UNAVAILABLE".to_string()
            }
        }
    }
}

impl ErrorExt for AdapterError {
    fn log_error(&self) -> &Self {
        error!("AdapterError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("AdapterError (warning): {}", self);
        self
    }

    // Malformed items stay malformed: the remediation is skipping, never
    // retrying the same payload.
    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            AdapterError::MissingField { field } => {
                format!("Upstream item is missing required field '{}'.", field)
            }
            AdapterError::UnknownPostType { item_id } => {
                format!("Could not determine the content type of item '{}'.", item_id)
            }
            _ => "Upstream item could not be normalized and was skipped.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            AdapterError::MissingField { .. } => "ADAPTER_MISSING_FIELD".to_string(),
            AdapterError::UnexpectedShape { .. } => "ADAPTER_UNEXPECTED_SHAPE".to_string(),
            AdapterError::UnknownPostType { .. } => "ADAPTER_UNKNOWN_POST_TYPE".to_string(),
            AdapterError::CursorDecode { .. } => "ADAPTER_CURSOR_DECODE".to_string(),
            AdapterError::UnsupportedOperation { .. } => {
                "ADAPTER_UNSUPPORTED_OPERATION".to_string()
            }
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DatabaseError::DatabaseLocked
                | DatabaseError::ConnectionFailed { .. }
                | DatabaseError::TransactionFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DatabaseError::DatabaseLocked => Some(Duration::from_millis(100)),
            _ if self.is_retryable() => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => {
                "Database connection failed. Please try again.".to_string()
            }
            DatabaseError::DatabaseLocked => {
                "Database is temporarily busy. Please try again.".to_string()
            }
            _ => "Database error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::QueryFailed { .. } => "DB_QUERY_FAILED".to_string(),
            DatabaseError::TransactionFailed { .. } => "DB_TRANSACTION_FAILED".to_string(),
            DatabaseError::ConstraintViolation { .. } => "DB_CONSTRAINT_VIOLATION".to_string(),
            DatabaseError::DatabaseLocked => "DB_LOCKED".to_string(),
            DatabaseError::RowDecode { .. } => "DB_ROW_DECODE".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors need user intervention
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => {
                "Configuration file not found. Please check the installation.".to_string()
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
            if error.is_retryable() {
                if let Some(retry_after) = error.retry_after() {
                    info!("Error is retryable. Retry after: {:?}", retry_after);
                }
            }
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
