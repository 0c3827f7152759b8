//! Configuration management for refit
//!
//! Layers, lowest priority first: built-in defaults, `refit.toml` (or
//! `.refit/config.toml`) in the workspace root, then `REFIT__SECTION__KEY`
//! environment variables.

pub mod logging;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Configuration error: {message}")]
    Invalid { message: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Plan execution behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Skip the post-execution type check
    pub skip_compilation: bool,
    /// Re-parse edited files in memory before writing
    pub verify_syntax: bool,
    /// Delete backups after a fully successful execution
    pub cleanup_backups: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            skip_compilation: false,
            verify_syntax: true,
            cleanup_backups: true,
        }
    }
}

/// Per-phase deadlines in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub parse_ms: u64,
    pub resolve_ms: u64,
    pub plan_ms: u64,
    pub execute_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            parse_ms: 30_000,
            resolve_ms: 30_000,
            plan_ms: 60_000,
            execute_ms: 120_000,
        }
    }
}

impl TimeoutConfig {
    pub fn parse(&self) -> Duration {
        Duration::from_millis(self.parse_ms)
    }

    pub fn resolve(&self) -> Duration {
        Duration::from_millis(self.resolve_ms)
    }

    pub fn plan(&self) -> Duration {
        Duration::from_millis(self.plan_ms)
    }

    pub fn execute(&self) -> Duration {
        Duration::from_millis(self.execute_ms)
    }
}

/// Editor-protocol server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9257,
        }
    }
}

/// Workspace scanning options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory names skipped during discovery
    pub exclude: Vec<String>,
    /// Load `_test.go` files
    pub include_tests: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            exclude: vec!["vendor".to_string(), "testdata".to_string()],
            include_tests: true,
        }
    }
}

const CONFIG_FILES: [&str; 2] = ["refit.toml", ".refit/config.toml"];

impl AppConfig {
    /// Load configuration for a workspace root (or the current directory)
    pub fn load(root: Option<&Path>) -> ConfigResult<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Toml},
            Figment,
        };

        let root = root.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        for candidate in CONFIG_FILES {
            let path = root.join(candidate);
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading TOML configuration");
                figment = figment.merge(Toml::file(path));
                break;
            }
        }

        let figment = figment.merge(Env::prefixed("REFIT__").split("__"));

        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;

        tracing::debug!(
            level = %config.logging.level,
            skip_compilation = config.execution.skip_compilation,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::invalid(format!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let t = &self.timeouts;
        if t.parse_ms == 0 || t.resolve_ms == 0 || t.plan_ms == 0 || t.execute_ms == 0 {
            return Err(ConfigError::invalid("Phase timeouts cannot be 0"));
        }

        if self.server.port == 0 {
            return Err(ConfigError::invalid("Server port cannot be 0"));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
