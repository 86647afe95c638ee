//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use crate::join::ManagerConfig;

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_HOST: &str = "127.0.0.1";
    pub const DEV_PORT: u16 = 8080;
    pub const DEV_JOIN_SOURCE_DIR: &str = "./data/joins";
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse environment from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Join-source feature settings, the `server.joins` object of the OGC config
/// surface. Absence of `JOIN_ENABLED` is not an error — the feature is
/// simply turned off and the Manager factory returns a disabled sentinel.
#[derive(Debug, Clone)]
pub struct JoinsSettings {
    pub enabled: bool,
    pub source_dir: PathBuf,
    pub max_days: u32,
    pub max_files: u32,
}

impl JoinsSettings {
    fn from_env() -> Self {
        let enabled = env::var("JOIN_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let source_dir = PathBuf::from(
            env::var("JOIN_SOURCE_DIR")
                .unwrap_or_else(|_| defaults::DEV_JOIN_SOURCE_DIR.to_string()),
        );

        let max_days = parse_non_negative("JOIN_MAX_DAYS");
        let max_files = parse_non_negative("JOIN_MAX_FILES");

        Self {
            enabled,
            source_dir,
            max_days,
            max_files,
        }
    }

    /// Coerce into the library-level `ManagerConfig`, or `None` when the
    /// feature is disabled.
    pub fn as_manager_config(&self) -> Option<ManagerConfig> {
        if !self.enabled {
            return None;
        }
        Some(ManagerConfig {
            source_dir: self.source_dir.clone(),
            max_days: self.max_days,
            max_files: self.max_files,
        })
    }
}

/// Parses an environment variable as a non-negative integer, coercing
/// negative or unparseable values to `0` with a warning (per the config
/// surface's "negative -> treat as 0 with a warning" rule).
fn parse_non_negative(var: &str) -> u32 {
    match env::var(var) {
        Err(_) => 0,
        Ok(raw) => match raw.trim().parse::<i64>() {
            Ok(v) if v >= 0 => v.min(u32::MAX as i64) as u32,
            Ok(v) => {
                tracing::warn!("{} is negative ({}), treating as 0", var, v);
                0
            }
            Err(_) => {
                tracing::warn!("{} is not a valid integer ({:?}), treating as 0", var, raw);
                0
            }
        },
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub joins: JoinsSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RUST_ENV`: Environment (development/production) - REQUIRED
    /// - `JOIN_HOST`: Server host (default: 127.0.0.1)
    /// - `JOIN_PORT`: Server port (default: 8080)
    /// - `JOIN_ENABLED`: presence/`true` enables the join feature
    /// - `JOIN_SOURCE_DIR`: where join sources are persisted
    /// - `JOIN_MAX_DAYS` / `JOIN_MAX_FILES`: retention caps (0 = no cap)
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_str = env::var("RUST_ENV").map_err(|_| ConfigError::MissingEnvVar("RUST_ENV"))?;

        let environment = Environment::from_str(&env_str).ok_or(ConfigError::InvalidValue(
            "RUST_ENV must be 'development' or 'production'",
        ))?;

        let host = env::var("JOIN_HOST").unwrap_or_else(|_| defaults::DEV_HOST.to_string());

        let port = env::var("JOIN_PORT")
            .unwrap_or_else(|_| defaults::DEV_PORT.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("JOIN_PORT must be a valid port number"))?;

        let joins = JoinsSettings::from_env();

        let config = Config {
            environment,
            host,
            port,
            joins,
        };

        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.joins.enabled && self.joins.source_dir == PathBuf::from(defaults::DEV_JOIN_SOURCE_DIR)
        {
            errors.push(format!(
                "JOIN_SOURCE_DIR is using development default '{}'. Set a production path.",
                defaults::DEV_JOIN_SOURCE_DIR
            ));
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    /// Get the server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}
