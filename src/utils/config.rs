//! Environment configuration
//!
//! `PORT_TIMEOUT`, `SCAN_WORKERS` and `SCAN_RETRIES` override whatever the
//! defaults or config file provided. They are read once, at startup. When
//! none of them is set, the first readable `.env` file (working directory,
//! then `/app/.env`) supplies them instead.

use crate::config::ScanConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_TIMEOUT: &str = "PORT_TIMEOUT";
pub const ENV_WORKERS: &str = "SCAN_WORKERS";
pub const ENV_RETRIES: &str = "SCAN_RETRIES";

/// `.env` locations tried in order
pub fn default_env_files() -> Vec<PathBuf> {
    vec![PathBuf::from(".env"), PathBuf::from("/app/.env")]
}

/// Environment configuration
pub struct EnvironmentConfig;

impl EnvironmentConfig {
    /// Layer the process environment, or a `.env` file, over `base`
    pub fn from_env(base: ScanConfig) -> ScanConfig {
        Self::from_env_or_files(base, |key| std::env::var(key).ok(), &default_env_files())
    }

    /// Layer `lookup` over `base`; if it sets none of the scanner variables,
    /// the first loadable file in `env_files` is used instead
    pub fn from_env_or_files<F>(base: ScanConfig, lookup: F, env_files: &[PathBuf]) -> ScanConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let any_set = [ENV_TIMEOUT, ENV_WORKERS, ENV_RETRIES]
            .into_iter()
            .any(|key| lookup(key).is_some());

        if !any_set {
            if let Some(values) = env_files.iter().find_map(|path| load_env_file(path)) {
                return Self::from_source(base, |key| values.get(key).cloned());
            }
            log::debug!("No .env file found, using defaults and config file");
        }

        Self::from_source(base, lookup)
    }

    /// Layer values from `lookup` over `base`; unparsable values keep the base value
    pub fn from_source<F>(base: ScanConfig, lookup: F) -> ScanConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = base;

        if let Some(timeout) = parse_var(&lookup, ENV_TIMEOUT) {
            config.timeout = timeout;
        }

        if let Some(workers) = parse_var(&lookup, ENV_WORKERS) {
            config.workers = workers;
        }

        if let Some(retries) = parse_var(&lookup, ENV_RETRIES) {
            config.retries = retries;
        }

        config
    }
}

/// Read `KEY=value` pairs from a dotenv file; `None` when it cannot be opened
fn load_env_file(path: &Path) -> Option<HashMap<String, String>> {
    let entries = dotenvy::from_path_iter(path).ok()?;

    let mut values = HashMap::new();
    for entry in entries {
        match entry {
            Ok((key, value)) => {
                values.insert(key, value);
            }
            Err(e) => log::warn!("Skipping malformed entry in {}: {}", path.display(), e),
        }
    }

    log::info!("Loaded environment from {}", path.display());
    Some(values)
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring invalid {} value {:?}: {}", key, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_no_variables_keeps_base() {
        let base = ScanConfig::new().with_timeout(700);
        assert_eq!(EnvironmentConfig::from_source(base.clone(), source(&[])), base);
    }

    #[test]
    fn test_variables_override_base() {
        let config = EnvironmentConfig::from_source(
            ScanConfig::default(),
            source(&[
                ("PORT_TIMEOUT", "250"),
                ("SCAN_WORKERS", "64"),
                ("SCAN_RETRIES", " 1 "),
            ]),
        );
        assert_eq!(config.timeout, 250);
        assert_eq!(config.workers, 64);
        assert_eq!(config.retries, 1);
    }

    fn env_file(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join(".env");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_env_file_used_when_no_variable_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.env");
        let found = env_file(&dir, "PORT_TIMEOUT=250\n# workers tuned for CI\nSCAN_WORKERS=32\n");

        let config = EnvironmentConfig::from_env_or_files(
            ScanConfig::default(),
            source(&[]),
            &[missing, found],
        );

        assert_eq!(config.timeout, 250);
        assert_eq!(config.workers, 32);
        assert_eq!(config.retries, ScanConfig::default().retries);
    }

    #[test]
    fn test_env_file_ignored_when_a_variable_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let found = env_file(&dir, "PORT_TIMEOUT=250\nSCAN_WORKERS=32\n");

        let config = EnvironmentConfig::from_env_or_files(
            ScanConfig::default(),
            source(&[("SCAN_RETRIES", "1")]),
            &[found],
        );

        assert_eq!(config.retries, 1);
        assert_eq!(config.timeout, ScanConfig::default().timeout);
        assert_eq!(config.workers, ScanConfig::default().workers);
    }

    #[test]
    fn test_no_env_file_keeps_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = ScanConfig::new().with_workers(12);

        let config = EnvironmentConfig::from_env_or_files(
            base.clone(),
            source(&[]),
            &[dir.path().join(".env")],
        );

        assert_eq!(config, base);
    }

    #[test]
    fn test_invalid_value_falls_back() {
        let config = EnvironmentConfig::from_source(
            ScanConfig::default(),
            source(&[("PORT_TIMEOUT", "fast"), ("SCAN_WORKERS", "-3")]),
        );
        assert_eq!(config.timeout, ScanConfig::default().timeout);
        assert_eq!(config.workers, ScanConfig::default().workers);
    }
}
