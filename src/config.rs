//! Configuration module for the portprobe scanner

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default per-attempt timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 5000;

/// Default number of connection attempts per port
pub const DEFAULT_RETRIES: u32 = 3;

/// Scanner configuration, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Timeout for each connect, handshake and banner read in milliseconds
    pub timeout: u64,

    /// Number of connection attempts per port
    pub retries: u32,

    /// Number of concurrent workers
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout in milliseconds
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of connection attempts per port
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the number of workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Retry policy applied to every port
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.timeout_duration() / 2)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::ScanError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| crate::ScanError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from `~/.portprobe.toml`, falling back to defaults
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let config_path = home_dir.join(".portprobe.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.workers == 0 {
            return Err(crate::ScanError::Config(
                "Worker count must be greater than 0".to_string(),
            ));
        }

        if self.timeout == 0 {
            return Err(crate::ScanError::Config(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Bounded retry policy for connection attempts.
///
/// A policy always allows at least one attempt; `backoff` is slept between
/// failed attempts, never after the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Whether another attempt may follow the given (1-based) attempt
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
