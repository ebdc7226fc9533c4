use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const STORAGE_IN_MEMORY: &str = "in-memory";
const STORAGE_DATABASE: &str = "database";

/// Application configuration, layered from defaults, config files and `APP__*`
/// environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    #[validate(length(min = 1))]
    pub environment: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// `in-memory` or `database`
    #[serde(default = "default_storage_backend")]
    #[validate(custom = "validate_storage_backend")]
    pub storage_backend: String,

    /// Database connection URL (used by the `database` backend)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Whether to run database migrations on startup
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    /// Capacity of the bounded domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Attempts for a quote write that loses its version compare-and-set
    #[serde(default = "default_transition_max_retries")]
    #[validate(range(min = 1, max = 20))]
    pub transition_max_retries: u32,

    /// Per-request deadline for conversion and purchase-order generation
    #[serde(default)]
    pub operation_deadline_ms: Option<u64>,

    #[serde(default = "default_quote_number_prefix")]
    #[validate(length(min = 1, max = 8))]
    pub quote_number_prefix: String,

    #[serde(default = "default_sales_order_number_prefix")]
    #[validate(length(min = 1, max = 8))]
    pub sales_order_number_prefix: String,

    #[serde(default = "default_purchase_order_number_prefix")]
    #[validate(length(min = 1, max = 8))]
    pub purchase_order_number_prefix: String,

    /// Currency applied when a quote is created without one
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub default_currency: String,

    /// Validity window applied when a quote is created without `valid_until`
    #[serde(default = "default_validity_days")]
    #[validate(range(min = 1, max = 3650))]
    pub default_validity_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_json: false,
            storage_backend: default_storage_backend(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            auto_migrate: true,
            event_channel_capacity: default_event_channel_capacity(),
            transition_max_retries: default_transition_max_retries(),
            operation_deadline_ms: None,
            quote_number_prefix: default_quote_number_prefix(),
            sales_order_number_prefix: default_sales_order_number_prefix(),
            purchase_order_number_prefix: default_purchase_order_number_prefix(),
            default_currency: default_currency(),
            default_validity_days: default_validity_days(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn uses_database(&self) -> bool {
        self.storage_backend.eq_ignore_ascii_case(STORAGE_DATABASE)
    }

    pub fn operation_deadline(&self) -> Option<std::time::Duration> {
        self.operation_deadline_ms
            .map(std::time::Duration::from_millis)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if self.uses_database() && self.database_url.trim().is_empty() {
            let mut err = ValidationError::new("database_url_required");
            err.message = Some("Set APP__DATABASE_URL when storage_backend = database".into());
            errors.add("database_url", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_storage_backend() -> String {
    STORAGE_IN_MEMORY.to_string()
}
fn default_database_url() -> String {
    "sqlite://quotes.db?mode=rwc".to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_true_bool() -> bool {
    true
}
fn default_event_channel_capacity() -> usize {
    1024
}
fn default_transition_max_retries() -> u32 {
    3
}
fn default_quote_number_prefix() -> String {
    "QT".to_string()
}
fn default_sales_order_number_prefix() -> String {
    "SO".to_string()
}
fn default_purchase_order_number_prefix() -> String {
    "PO".to_string()
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_validity_days() -> u32 {
    30
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_storage_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        STORAGE_IN_MEMORY | STORAGE_DATABASE => Ok(()),
        _ => {
            let mut err = ValidationError::new("storage_backend");
            err.message = Some("Must be one of: in-memory, database".into());
            Err(err)
        }
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter.
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("quote_engine={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.as_str())?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    finish(config)
}

fn finish(config: Config) -> Result<AppConfig, AppConfigError> {
    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use config::FileFormat;

    fn from_toml(content: &str) -> Result<AppConfig, AppConfigError> {
        finish(
            Config::builder()
                .add_source(File::from_str(content, FileFormat::Toml))
                .build()?,
        )
    }

    #[test]
    fn empty_sources_use_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.quote_number_prefix, "QT");
        assert_eq!(config.default_currency, "USD");
        assert_eq!(config.default_validity_days, 30);
        assert!(!config.uses_database());
        assert_eq!(config.operation_deadline(), None);
    }

    #[test]
    fn file_values_override_defaults() {
        let config = from_toml(
            r#"
            storage_backend = "database"
            database_url = "postgres://localhost/quotes"
            operation_deadline_ms = 1500
            quote_number_prefix = "Q"
            "#,
        )
        .unwrap();
        assert!(config.uses_database());
        assert_eq!(
            config.operation_deadline(),
            Some(std::time::Duration::from_millis(1500))
        );
        assert_eq!(config.quote_number_prefix, "Q");
    }

    #[test]
    fn invalid_values_fail_validation() {
        let result = from_toml(
            r#"
            log_level = "loud"
            storage_backend = "redis"
            event_channel_capacity = 0
            default_currency = "EURO"
            "#,
        );
        let errors = assert_matches!(result, Err(AppConfigError::Validation(e)) => e);
        let fields = errors.field_errors();
        assert!(fields.contains_key("log_level"));
        assert!(fields.contains_key("storage_backend"));
        assert!(fields.contains_key("event_channel_capacity"));
        assert!(fields.contains_key("default_currency"));
    }

    #[test]
    fn min_connections_above_max_is_rejected() {
        assert_matches!(
            from_toml("db_min_connections = 20\ndb_max_connections = 5"),
            Err(AppConfigError::Validation(_))
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert_matches!(
            from_toml("jwt_secret = \"nope\""),
            Err(AppConfigError::Load(_))
        );
    }
}
