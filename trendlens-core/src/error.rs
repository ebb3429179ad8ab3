use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Gateway API error: {0}")]
    Gateway(#[from] GatewayApiError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failures talking to the scraping gateway.
///
/// Transport problems (timeout, connection) and decodable-but-unsuccessful
/// business responses are kept apart: the former are transient and worth
/// retrying, the latter carry the gateway's own error code and usually are
/// not.
#[derive(Error, Debug, Clone)]
pub enum GatewayApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Gateway business error {code}: {message}")]
    Business { code: i64, message: String },

    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Transport failure: {details}")]
    Transport { details: String },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("API endpoint unavailable: {endpoint}")]
    EndpointUnavailable { endpoint: String },
}

/// A single malformed upstream item. Never aborts a batch: the caller logs
/// the error and skips the item.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Unexpected shape for {field}: {details}")]
    UnexpectedShape { field: String, details: String },

    #[error("Cannot classify post type for item {item_id}")]
    UnknownPostType { item_id: String },

    #[error("Cursor decode failed: {details}")]
    CursorDecode { details: String },

    #[error("Operation {operation} not supported on {platform}")]
    UnsupportedOperation { platform: String, operation: String },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("Row decode failed: {details}")]
    RowDecode { details: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
