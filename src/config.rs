use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Configuration validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Application configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL.
    #[validate(length(min = 1, message = "database_url must not be empty"))]
    pub database_url: String,

    /// Deployment environment name (development, staging, production).
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log filter passed to the tracing subscriber.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum database connections in the pool.
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Buffer size of the domain event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_event_buffer() -> usize {
    256
}

impl AppConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            environment: default_environment(),
            log_level: default_log_level(),
            db_max_connections: default_db_max_connections(),
            event_buffer: default_event_buffer(),
        }
    }

    /// Loads configuration from `config/default.toml`, an optional
    /// per-environment file, and `APP__`-prefixed environment variables
    /// (highest precedence).
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("APP__ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?;

        let default_file = Path::new(CONFIG_DIR).join("default.toml");
        if default_file.exists() {
            builder = builder.add_source(File::from(default_file));
        }
        let env_file = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
        if env_file.exists() {
            builder = builder.add_source(File::from(env_file));
        }

        builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(environment = %config.environment, "configuration loaded");
        Ok(config)
    }

    /// Initializes the global tracing subscriber from `log_level`, honoring
    /// `RUST_LOG` when set.
    pub fn init_tracing(&self) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(self.log_level.clone()));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}
