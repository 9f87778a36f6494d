//! Configuration schema, loaded from JSON or YAML.
//!
//! Unknown fields are ignored and missing fields take the defaults below,
//! matching the behavior of a permissive host-language config loader.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration, mirroring the `connection` / `pool` / `server`
/// blocks a host would hand this crate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    /// Accepted and never interpreted by this crate; reserved for a future
    /// network front-end that does not exist in this core.
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Path to the database file, or `:memory:`.
    pub database: String,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub check_same_thread: bool,
    #[serde(default)]
    pub isolation_level: Option<IsolationLevel>,
    #[serde(default = "default_cached_statements")]
    pub cached_statements: i64,
    #[serde(default)]
    pub uri: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum IsolationLevel {
    Deferred,
    Immediate,
    Exclusive,
}

impl IsolationLevel {
    /// The `BEGIN` variant this isolation level maps to. `TransactionScope`
    /// always issues an explicit `BEGIN`, so this is the value that wins
    /// over any driver-side default.
    pub(crate) fn begin_sql(self) -> &'static str {
        match self {
            IsolationLevel::Deferred => "BEGIN DEFERRED",
            IsolationLevel::Immediate => "BEGIN IMMEDIATE",
            IsolationLevel::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[serde(default)]
    pub max_queries: u64,
    #[serde(default = "default_max_idle_time")]
    pub max_idle_time: f64,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: f64,
    #[serde(default)]
    pub pool_recycle: i64,
    #[serde(default)]
    pub echo: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min_size: default_min_size(),
            max_size: default_max_size(),
            max_queries: 0,
            max_idle_time: default_max_idle_time(),
            connection_timeout: default_connection_timeout(),
            pool_recycle: 0,
            echo: false,
        }
    }
}

/// Reserved, accepted-and-ignored network front-end block.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub charset: Option<String>,
    pub autocommit: Option<bool>,
}

fn default_timeout() -> f64 {
    5.0
}
fn default_cached_statements() -> i64 {
    128
}
fn default_min_size() -> u32 {
    1
}
fn default_max_size() -> u32 {
    10
}
fn default_max_idle_time() -> f64 {
    600.0
}
fn default_connection_timeout() -> f64 {
    30.0
}

impl Config {
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(input)
            .map_err(|e| Error::Configuration(format!("invalid JSON configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(input)
            .map_err(|e| Error::Configuration(format!("invalid YAML configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config from disk, choosing JSON or YAML by file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("could not read {}: {e}", path.display()))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            _ => Err(Error::Configuration(format!(
                "unrecognized configuration extension for {}",
                path.display()
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.pool.max_size < self.pool.min_size {
            return Err(Error::Configuration(format!(
                "pool.max_size ({}) must be >= pool.min_size ({})",
                self.pool.max_size, self.pool.min_size
            )));
        }
        if self.pool.max_size == 0 {
            return Err(Error::Configuration(
                "pool.max_size must be at least 1".into(),
            ));
        }
        if self.connection.timeout < 0.0 {
            return Err(Error::Configuration(
                "connection.timeout must not be negative".into(),
            ));
        }
        if self.pool.max_idle_time < 0.0 {
            return Err(Error::Configuration(
                "pool.max_idle_time must not be negative".into(),
            ));
        }
        if self.pool.connection_timeout < 0.0 {
            return Err(Error::Configuration(
                "pool.connection_timeout must not be negative".into(),
            ));
        }
        if self.connection.database.is_empty() {
            return Err(Error::Configuration(
                "connection.database must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn busy_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connection.timeout.max(0.0))
    }

    /// Capacity of each pooled connection's prepared-statement cache.
    pub(crate) fn cached_statements(&self) -> usize {
        self.connection.cached_statements.max(0) as usize
    }

    pub(crate) fn connection_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.pool.connection_timeout.max(0.0))
    }

    pub(crate) fn max_idle_time(&self) -> Duration {
        Duration::from_secs_f64(self.pool.max_idle_time.max(0.0))
    }

    pub(crate) fn pool_recycle(&self) -> Option<Duration> {
        (self.pool.pool_recycle > 0).then(|| Duration::from_secs(self.pool.pool_recycle as u64))
    }

    /// The `BEGIN` statement `TransactionScope` issues, honoring
    /// `connection.isolation_level` if one is configured. The explicit
    /// `BEGIN` always wins over any driver-side default isolation mode.
    pub(crate) fn begin_sql(&self) -> &'static str {
        match self.connection.isolation_level {
            Some(level) => level.begin_sql(),
            None => "BEGIN",
        }
    }
}
