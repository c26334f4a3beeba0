//! Engine configuration.
//!
//! Resolved from a TOML config file (`~/.config/tasknest/config.toml` by
//! default) merged over compiled defaults. A missing default file is not
//! an error; an explicitly requested file that does not exist is.

use std::path::PathBuf;
use std::time::Duration;

use crate::remote::RetryConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    remote: RemoteFileConfig,
    sync: SyncFileConfig,
    cache: CacheFileConfig,
}

/// `[remote]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RemoteFileConfig {
    fetch_timeout_secs: Option<u64>,
    write_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    apply_retry_limit: Option<u32>,
    apply_retry_delay_ms: Option<u64>,
    feed_buffer: Option<usize>,
}

/// `[cache]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CacheFileConfig {
    watch_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout applied to one-shot remote fetches.
    pub fetch_timeout: Duration,
    /// Number of retries for remote writes on a retryable failure.
    pub write_retries: u32,
    /// Delay between remote write retries.
    pub retry_delay: Duration,
    /// Attempts to re-apply a failed cache write in the sync loop.
    pub apply_retry_limit: u32,
    /// Delay between cache-write retry attempts.
    pub apply_retry_delay: Duration,
    /// Channel capacity for change-feed hand-off.
    pub feed_buffer: usize,
    /// Channel capacity for cache watch streams.
    pub watch_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            write_retries: 1,
            retry_delay: Duration::from_millis(200),
            apply_retry_limit: 2,
            apply_retry_delay: Duration::from_millis(50),
            feed_buffer: 64,
            watch_buffer: 32,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file merged over defaults.
    ///
    /// If `explicit_path` is `Some`, the file must exist. If `None`, the
    /// default path (`~/.config/tasknest/config.toml`) is tried and a
    /// missing file falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicitly requested file cannot be
    /// read, or if the file contents fail to parse.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let file = load_config_file(explicit_path)?;
        Ok(Self::resolve(&file))
    }

    /// Resolve an `EngineConfig` from a parsed config file.
    ///
    /// Separated from `load()` to enable unit testing without touching
    /// the filesystem.
    #[must_use]
    fn resolve(file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            fetch_timeout: file
                .remote
                .fetch_timeout_secs
                .map_or(defaults.fetch_timeout, Duration::from_secs),
            write_retries: file.remote.write_retries.unwrap_or(defaults.write_retries),
            retry_delay: file
                .remote
                .retry_delay_ms
                .map_or(defaults.retry_delay, Duration::from_millis),
            apply_retry_limit: file
                .sync
                .apply_retry_limit
                .unwrap_or(defaults.apply_retry_limit),
            apply_retry_delay: file
                .sync
                .apply_retry_delay_ms
                .map_or(defaults.apply_retry_delay, Duration::from_millis),
            feed_buffer: file.sync.feed_buffer.unwrap_or(defaults.feed_buffer),
            watch_buffer: file.cache.watch_buffer.unwrap_or(defaults.watch_buffer),
        }
    }

    /// The remote write retry policy carried by this configuration.
    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            write_retries: self.write_retries,
            retry_delay: self.retry_delay,
        }
    }
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and a missing
/// file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("tasknest").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
