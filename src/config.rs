//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. TOML file (`--config`, else `<config dir>/dupecache/config.toml`)
//! 3. Environment variables prefixed `DUPECACHE_` (e.g. `DUPECACHE_WORKERS=8`)
//! 4. Command-line flags ([`ConfigOverrides`])
//!
//! # Example
//!
//! ```no_run
//! use dupecache::config::{Config, ConfigOverrides};
//!
//! let overrides = ConfigOverrides {
//!     workers: Some(8),
//!     ..ConfigOverrides::default()
//! };
//! let config = Config::load(None, &overrides).unwrap();
//! assert_eq!(config.workers, 8);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::duplicates::CoordinatorConfig;
use crate::pool::QueueOrder;
use crate::scanner::{WalkerConfig, DEFAULT_MIN_SIZE};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "DUPECACHE_";

/// Default report file name.
pub const DEFAULT_OUTPUT: &str = "Result.txt";

/// Configuration errors.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A layer could not be read or has the wrong shape.
    #[error("Invalid configuration: {0}")]
    Load(#[from] figment::Error),

    /// A value is out of range.
    #[error("Invalid value for '{key}': {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// No home directory to derive default paths from.
    #[error("Could not determine platform directories; pass --cache explicitly")]
    NoProjectDirs,

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of hashing worker threads
    pub workers: usize,
    /// Pending tasks allowed before the walker blocks
    pub max_queue_depth: usize,
    /// Files smaller than this (bytes) are ignored
    pub min_size: u64,
    /// Task hand-out order
    pub queue_order: QueueOrder,
    /// Fingerprint database; platform cache dir when unset
    pub cache_path: Option<PathBuf>,
    /// Report file written after a scan
    pub output: PathBuf,
    /// Pause between background passes
    pub background_interval_secs: u64,
    /// Interim report interval during background passes
    pub report_interval_secs: u64,
    /// Drop records of deleted files before a scan
    pub sweep_on_start: bool,
    /// Cap on groups in interim background reports
    pub report_group_limit: Option<usize>,
    /// Follow symbolic links while walking
    pub follow_symlinks: bool,
    /// Skip dot-files and dot-directories
    pub skip_hidden: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 3,
            max_queue_depth: 64,
            min_size: DEFAULT_MIN_SIZE,
            queue_order: QueueOrder::Lifo,
            cache_path: None,
            output: PathBuf::from(DEFAULT_OUTPUT),
            background_interval_secs: 30,
            report_interval_secs: 5,
            sweep_on_start: true,
            report_group_limit: None,
            follow_symlinks: false,
            skip_hidden: false,
        }
    }
}

/// Values set on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queue_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_order: Option<QueueOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_on_start: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_group_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_symlinks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_hidden: Option<bool>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "dupecache", "dupecache")
}

impl Config {
    /// Platform config file path (`.../dupecache/config.toml`).
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Platform cache database path (`.../dupecache/fingerprints.db`).
    #[must_use]
    pub fn default_cache_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.cache_dir().join("fingerprints.db"))
    }

    /// The figment stack for `config_file` and `overrides`, without extracting.
    ///
    /// A missing config file is skipped silently.
    #[must_use]
    pub fn figment(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        let file = config_file
            .map(Path::to_path_buf)
            .or_else(Self::default_config_path);
        if let Some(path) = file {
            log::debug!("Config file: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
    }

    /// Load and validate the layered configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer is malformed or a value is invalid.
    pub fn load(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let config: Config = Self::figment(config_file, overrides).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scanner cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_queue_depth == 0 {
            return Err(ConfigError::Invalid {
                key: "max_queue_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.report_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "report_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "output",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Cache database path: configured, else the platform default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProjectDirs`] if neither is available.
    pub fn resolved_cache_path(&self) -> Result<PathBuf, ConfigError> {
        self.cache_path
            .clone()
            .or_else(Self::default_cache_path)
            .ok_or(ConfigError::NoProjectDirs)
    }

    /// Coordinator settings. The report file itself is always excluded.
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_workers(self.workers)
            .with_max_queue_depth(self.max_queue_depth)
            .with_min_size(self.min_size)
            .with_queue_order(self.queue_order)
            .with_exclude(self.output.clone())
            .with_sweep_on_start(self.sweep_on_start)
            .with_background_interval(Duration::from_secs(self.background_interval_secs))
            .with_report_interval(Duration::from_secs(self.report_interval_secs))
            .with_report_group_limit(self.report_group_limit)
    }

    /// Walker settings.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig::new(self.follow_symlinks, self.skip_hidden)
    }

    /// Render as TOML, e.g. to seed a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if rendering fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
