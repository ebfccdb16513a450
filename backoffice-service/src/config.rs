//! Configuration for backoffice-service.

use service_core::config::Config as CommonConfig;
use service_core::error::AppError;

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct BackofficeConfig {
    pub common: CommonConfig,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::ConfigError(anyhow::anyhow!("Invalid value for {}", key))),
        Err(_) => Ok(default),
    }
}

impl BackofficeConfig {
    /// Load configuration from the environment, `.env` included. The shared
    /// section (port) goes through the common loader, so `APP__PORT` and the
    /// optional `configuration` file apply here too.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::ConfigError(anyhow::anyhow!("DATABASE_URL must be set")))?;

        Ok(Self {
            common: CommonConfig::load()?,
            service_name: env_or("SERVICE_NAME", "backoffice-service"),
            log_level: env_or("LOG_LEVEL", "info"),
            otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_parse("DB_MAX_CONNECTIONS", 10)?,
                min_connections: env_parse("DB_MIN_CONNECTIONS", 1)?,
            },
        })
    }
}
