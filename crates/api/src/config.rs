use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use domain::services::SessionConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub guestbook: GuestbookConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Guestbook behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestbookConfig {
    /// Bound on each store call made while handling a submission
    #[serde(default = "default_store_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Invitation ids ending with this are served by the preview backend
    #[serde(default = "default_demo_suffix")]
    pub demo_suffix: String,

    #[serde(default = "default_initial_window")]
    pub initial_window: usize,

    #[serde(default = "default_window_step")]
    pub window_step: usize,
}

impl Default for GuestbookConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_store_timeout_ms(),
            demo_suffix: default_demo_suffix(),
            initial_window: default_initial_window(),
            window_step: default_window_step(),
        }
    }
}

impl GuestbookConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            initial_window: self.initial_window,
            window_step: self.window_step,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_store_timeout_ms() -> u64 {
    10_000
}
fn default_demo_suffix() -> String {
    domain::services::DEFAULT_DEMO_SUFFIX.to_string()
}
fn default_initial_window() -> usize {
    10
}
fn default_window_step() -> usize {
    10
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("GB").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 20
            min_connections = 2
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [guestbook]
            request_timeout_ms = 10000
            demo_suffix = "-demo"
            initial_window = 10
            window_step = 10
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "GB__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        // An empty suffix would silently disable the preview backend.
        if self.guestbook.demo_suffix.is_empty() {
            return Err(ConfigValidationError::InvalidValue(
                "guestbook.demo_suffix cannot be empty".to_string(),
            ));
        }

        if self.guestbook.initial_window == 0 || self.guestbook.window_step == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "guestbook window sizes must be positive".to_string(),
            ));
        }

        if self.guestbook.request_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "guestbook.request_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
