//! Dispatcher configuration.
//!
//! # Sources
//!
//! 1. Defaults
//! 2. A JSON or TOML document (`from_json_str`, `from_toml_str`, `from_file`)
//! 3. Environment variables (`ROUTED_EVENTS_*`), via [`DispatcherConfig::apply_env`]
//!
//! Each layer overrides the previous.
//!
//! ```
//! use routed_events::config::DispatcherConfig;
//!
//! let config = DispatcherConfig::from_toml_str(r#"
//!     pool_size = 8
//!
//!     [routes."order.*"]
//!     driver = "external"
//!     topic = "orders"
//! "#).unwrap();
//!
//! assert_eq!(config.pool_size, 8);
//! assert_eq!(config.queue_capacity, 1024);
//! assert!(config.routes.contains_key("order.*"));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::router::RouteConfig;

pub const ENV_POOL_SIZE: &str = "ROUTED_EVENTS_POOL_SIZE";
pub const ENV_QUEUE_CAPACITY: &str = "ROUTED_EVENTS_QUEUE_CAPACITY";
pub const ENV_FORCE_SYNC: &str = "ROUTED_EVENTS_FORCE_SYNC";

pub const DEFAULT_POOL_SIZE: usize = 100;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse {
            format: "json",
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse {
            format: "toml",
            message: err.to_string(),
        }
    }
}

/// Construction-time settings for a [`Dispatcher`](crate::Dispatcher).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Worker threads in the async pool.
    pub pool_size: usize,
    /// Jobs that may wait for a worker before submission fails.
    pub queue_capacity: usize,
    /// Run async listeners on the dispatching thread.
    pub force_sync: bool,
    /// Pattern to route. Hot-reloadable through `Dispatcher::apply_config`.
    pub routes: HashMap<String, RouteConfig>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            force_sync: false,
            routes: HashMap::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_force_sync(mut self, force_sync: bool) -> Self {
        self.force_sync = force_sync;
        self
    }

    pub fn with_route(mut self, pattern: impl Into<String>, route: RouteConfig) -> Self {
        self.routes.insert(pattern.into(), route);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.json` or `.toml` file, chosen by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => Err(ConfigError::Invalid(format!(
                "unsupported config extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overlay `ROUTED_EVENTS_*` variables from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay `ROUTED_EVENTS_*` variables read through `lookup`.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_POOL_SIZE) {
            self.pool_size = parse_usize(ENV_POOL_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_QUEUE_CAPACITY) {
            self.queue_capacity = parse_usize(ENV_QUEUE_CAPACITY, &value)?;
        }
        if let Some(value) = lookup(ENV_FORCE_SYNC) {
            self.force_sync = parse_bool(&value).ok_or_else(|| {
                ConfigError::Invalid(format!("{}: expected bool, got {:?}", ENV_FORCE_SYNC, value))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be positive".into()));
        }
        if let Some(pattern) = self.routes.keys().find(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("empty route pattern {:?}", pattern)));
        }
        Ok(())
    }
}

fn parse_usize(var: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}: expected integer, got {:?}", var, value)))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
