//! Immutable run configuration.
//!
//! Everything the pipeline needs is resolved once, up front, and handed
//! around by reference. Request templates and pagination limits live here
//! instead of in process-wide mutable defaults.

use crate::error::{ConfigError, CoreError};
use crate::types::Platform;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "TRENDLENS_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub database_url: String,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_minutes: u64,
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Targets the polling loop revisits every interval.
    #[serde(default)]
    pub watch: Vec<WatchTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Limits for one "fetch all" invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Hard page cap per invocation, independent of `has_more`.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Pause between page fetches. Part of the contract with the gateway:
    /// aggressive pagination reliably triggers upstream throttling.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    /// Requested items per page where the platform honors it.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl PaginationConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            page_delay_ms: default_page_delay_ms(),
            page_size: default_page_size(),
        }
    }
}

/// One thing to ingest: either a keyword search or a single known item.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchTarget {
    pub platform: Platform,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    /// Whether search hits also get their comment trees fetched.
    #[serde(default = "default_true")]
    pub include_comments: bool,
}

fn default_polling_interval() -> u64 {
    30
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_pages() -> u32 {
    50
}

fn default_page_delay_ms() -> u64 {
    1500
}

fn default_page_size() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load from the file named by `TRENDLENS_CONFIG`, falling back to
    /// environment variables when the variable is unset.
    pub fn load() -> Result<Self, CoreError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path),
            Err(_) => Self::from_env(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|_| {
            CoreError::Config(ConfigError::FileNotFound {
                path: path.display().to_string(),
            })
        })?;
        let config: AppConfig =
            toml::from_str(&raw).map_err(|e| CoreError::Config(ConfigError::Parse(e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal configuration from `TRENDLENS_GATEWAY_URL`,
    /// `TRENDLENS_GATEWAY_API_KEY` and `TRENDLENS_DATABASE_URL`.
    pub fn from_env() -> Result<Self, CoreError> {
        let base_url = require_env("TRENDLENS_GATEWAY_URL")?;
        let api_key = require_env("TRENDLENS_GATEWAY_API_KEY")?;
        let database_url = std::env::var("TRENDLENS_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://trendlens.db".to_string());

        let config = Self {
            gateway: GatewayConfig {
                base_url,
                api_key,
                timeout_seconds: default_timeout_seconds(),
            },
            database_url,
            polling_interval_minutes: default_polling_interval(),
            pagination: PaginationConfig::default(),
            watch: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.gateway.base_url.is_empty() {
            return Err(CoreError::Config(ConfigError::MissingField {
                field: "gateway.base_url".to_string(),
            }));
        }
        if self.gateway.api_key.is_empty() {
            return Err(CoreError::Config(ConfigError::MissingField {
                field: "gateway.api_key".to_string(),
            }));
        }
        if self.pagination.max_pages == 0 {
            return Err(CoreError::Config(ConfigError::InvalidValue {
                field: "pagination.max_pages".to_string(),
                value: "0".to_string(),
            }));
        }
        for target in &self.watch {
            if target.keyword.is_none() && target.item_id.is_none() {
                return Err(CoreError::Config(ConfigError::ValidationFailed {
                    reason: format!(
                        "watch target for {} needs a keyword or an item_id",
                        target.platform
                    ),
                }));
            }
        }
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_minutes * 60)
    }
}

fn require_env(var_name: &str) -> Result<String, CoreError> {
    std::env::var(var_name).map_err(|_| {
        CoreError::Config(ConfigError::MissingEnvironmentVariable {
            var_name: var_name.to_string(),
        })
    })
}
