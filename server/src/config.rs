//! Configuration management for the server.

use orchard_engine::{ComparePolicy, MigrationOptions, DEFAULT_FLOAT_EPSILON};
use std::env;

/// Default number of cloud rows read per page.
pub const DEFAULT_CLOUD_PAGE_SIZE: i64 = 500;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Shared bearer token; anonymous access is allowed when unset
    pub auth_secret: Option<String>,
    /// Absolute tolerance for float and coordinate comparison
    pub float_epsilon: f64,
    /// Fields left out of comparison (sync bookkeeping and the like)
    pub ignored_fields: Vec<String>,
    /// Ids migrated concurrently per request
    pub migration_concurrency: usize,
    /// Rows per page when reading the cloud table
    pub cloud_page_size: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;

        let auth_secret = lookup("AUTH_SECRET").filter(|s| !s.is_empty());

        let float_epsilon = match lookup("RECONCILE_FLOAT_EPSILON") {
            Some(raw) => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => v,
                _ => return Err(ConfigError::InvalidEpsilon(raw)),
            },
            None => DEFAULT_FLOAT_EPSILON,
        };

        let ignored_fields = lookup("RECONCILE_IGNORED_FIELDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let migration_concurrency = match lookup("MIGRATION_CONCURRENCY") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(v) if v > 0 => v,
                _ => return Err(ConfigError::InvalidConcurrency(raw)),
            },
            None => MigrationOptions::default().concurrency,
        };

        let cloud_page_size = match lookup("CLOUD_PAGE_SIZE") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(v) if v > 0 => v,
                _ => return Err(ConfigError::InvalidPageSize(raw)),
            },
            None => DEFAULT_CLOUD_PAGE_SIZE,
        };

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret,
            float_epsilon,
            ignored_fields,
            migration_concurrency,
            cloud_page_size,
        })
    }

    pub fn compare_policy(&self) -> ComparePolicy {
        self.ignored_fields.iter().fold(
            ComparePolicy::default().with_float_epsilon(self.float_epsilon),
            |policy, field| policy.ignore_field(field.as_str()),
        )
    }

    pub fn migration_options(&self) -> MigrationOptions {
        MigrationOptions {
            concurrency: self.migration_concurrency,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid RECONCILE_FLOAT_EPSILON value: {0}")]
    InvalidEpsilon(String),

    #[error("Invalid MIGRATION_CONCURRENCY value: {0}")]
    InvalidConcurrency(String),

    #[error("Invalid CLOUD_PAGE_SIZE value: {0}")]
    InvalidPageSize(String),
}
