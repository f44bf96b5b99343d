//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use serde::Serialize;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;
use utoipa::ToSchema;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which document store backs the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("'{}' is not one of postgres, memory", other)),
        }
    }
}

/// Identifies the hosted project. Served to clients as-is by `GET /config`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub project_id: String,
    pub api_key: String,
    pub auth_domain: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub store_backend: StoreBackend,
    /// Required when `store_backend` is Postgres.
    pub database_url: Option<String>,
    pub cors_origin: String,
    pub session_ttl_days: i64,
    pub project: ProjectConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        // --- Project identity ---
        let project = ProjectConfig {
            project_id: required("STATION_FIT_PROJECT_ID")?,
            api_key: required("STATION_FIT_API_KEY")?,
            auth_domain: required("STATION_FIT_AUTH_DOMAIN")?,
            storage_bucket: required("STATION_FIT_STORAGE_BUCKET")?,
            messaging_sender_id: required("STATION_FIT_MESSAGING_SENDER_ID")?,
            app_id: required("STATION_FIT_APP_ID")?,
        };

        // --- Server and store settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let store_backend = lookup("STORE_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .parse::<StoreBackend>()
            .map_err(|e| ConfigError::InvalidValue("STORE_BACKEND".to_string(), e))?;

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(required("DATABASE_URL")?),
            StoreBackend::Memory => lookup("DATABASE_URL"),
        };

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());

        let ttl_str = lookup("SESSION_TTL_DAYS").unwrap_or_else(|| "30".to_string());
        let session_ttl_days = match ttl_str.trim().parse::<i64>() {
            Ok(days) if days > 0 => days,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "SESSION_TTL_DAYS".to_string(),
                    format!("'{}' is not a positive number of days", ttl_str),
                ))
            }
        };

        Ok(Self {
            bind_address,
            log_level,
            store_backend,
            database_url,
            cors_origin,
            session_ttl_days,
            project,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn project_vars() -> HashMap<&'static str, String> {
        [
            ("STATION_FIT_PROJECT_ID", "station-1-fit"),
            ("STATION_FIT_API_KEY", "key"),
            ("STATION_FIT_AUTH_DOMAIN", "station-1-fit.example.com"),
            ("STATION_FIT_STORAGE_BUCKET", "station-1-fit.appspot.com"),
            ("STATION_FIT_MESSAGING_SENDER_ID", "1234"),
            ("STATION_FIT_APP_ID", "1:1234:web:abcd"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn postgres_backend_needs_a_database_url() {
        let vars = project_vars();
        match load(&vars) {
            Err(ConfigError::MissingVar(var)) => assert_eq!(var, "DATABASE_URL"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn memory_backend_uses_defaults() {
        let mut vars = project_vars();
        vars.insert("STORE_BACKEND", "memory".into());
        let config = load(&vars).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.session_ttl_days, 30);
        assert_eq!(config.cors_origin, "http://localhost:5173");
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn missing_project_value_fails_fast() {
        let mut vars = project_vars();
        vars.remove("STATION_FIT_APP_ID");
        vars.insert("STORE_BACKEND", "memory".into());
        assert!(matches!(load(&vars), Err(ConfigError::MissingVar(v)) if v == "STATION_FIT_APP_ID"));
    }

    #[test]
    fn rejects_bad_values() {
        let mut vars = project_vars();
        vars.insert("STORE_BACKEND", "sqlite".into());
        assert!(matches!(load(&vars), Err(ConfigError::InvalidValue(v, _)) if v == "STORE_BACKEND"));

        vars.insert("STORE_BACKEND", "memory".into());
        vars.insert("SESSION_TTL_DAYS", "0".into());
        assert!(matches!(load(&vars), Err(ConfigError::InvalidValue(v, _)) if v == "SESSION_TTL_DAYS"));
    }
}
