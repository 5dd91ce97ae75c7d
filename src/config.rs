//! Runtime configuration
//!
//! Values come from `DIGY_*` environment variables with defaults; the CLI
//! overrides individual fields after loading.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DigyError, Result};

pub const DIGY_BASE_DIR: &str = "DIGY_BASE_DIR";
pub const DIGY_MEMORY_ROOT: &str = "DIGY_MEMORY_ROOT";
pub const DIGY_TIMEOUT_SECS: &str = "DIGY_TIMEOUT_SECS";
pub const DIGY_BASE_LIMIT_MB: &str = "DIGY_BASE_LIMIT_MB";
pub const DIGY_SAFETY_MARGIN_MB: &str = "DIGY_SAFETY_MARGIN_MB";
pub const DIGY_ISOLATION_IMAGE: &str = "DIGY_ISOLATION_IMAGE";
pub const DIGY_PYTHON: &str = "DIGY_PYTHON";
pub const DIGY_LOG_LEVEL: &str = "DIGY_LOG_LEVEL";

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_BASE_LIMIT_MB: u64 = 100;
pub const DEFAULT_SAFETY_MARGIN_MB: u64 = 256;
pub const DEFAULT_ISOLATION_IMAGE: &str = "python:3.11-slim";

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    /// Scratch root for isolated staging dirs and runtime environments
    pub base_dir: PathBuf,
    /// Root for memory-resident clones
    pub memory_root: PathBuf,
    /// Wall-clock bound for one script execution
    pub execution_timeout: Duration,
    /// Per-repository memory estimate, in bytes
    pub base_limit: u64,
    /// Headroom kept free by admission control, in bytes
    pub safety_margin: u64,
    /// Container image used for isolated loads
    pub isolation_image: String,
    /// Interpreter used to create runtime environments
    pub python: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: env::temp_dir().join("digy"),
            memory_root: default_memory_root(),
            execution_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            base_limit: DEFAULT_BASE_LIMIT_MB * MB,
            safety_margin: DEFAULT_SAFETY_MARGIN_MB * MB,
            isolation_image: DEFAULT_ISOLATION_IMAGE.to_string(),
            python: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(dir) = get(DIGY_BASE_DIR) {
            config.base_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(DIGY_MEMORY_ROOT) {
            config.memory_root = PathBuf::from(dir);
        }
        if let Some(secs) = get(DIGY_TIMEOUT_SECS) {
            config.execution_timeout = Duration::from_secs(parse_u64(DIGY_TIMEOUT_SECS, &secs)?);
        }
        if let Some(mb) = get(DIGY_BASE_LIMIT_MB) {
            config.base_limit = parse_u64(DIGY_BASE_LIMIT_MB, &mb)? * MB;
        }
        if let Some(mb) = get(DIGY_SAFETY_MARGIN_MB) {
            config.safety_margin = parse_u64(DIGY_SAFETY_MARGIN_MB, &mb)? * MB;
        }
        if let Some(image) = get(DIGY_ISOLATION_IMAGE) {
            config.isolation_image = image;
        }
        if let Some(python) = get(DIGY_PYTHON) {
            config.python = Some(PathBuf::from(python));
        }

        Ok(config)
    }

    /// Directory holding runtime environments
    pub fn env_root(&self) -> PathBuf {
        self.base_dir.join("envs")
    }

    /// Directory holding staging dirs mounted into isolation contexts
    pub fn isolated_root(&self) -> PathBuf {
        self.base_dir.join("isolated")
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| DigyError::ConfigError(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

fn default_memory_root() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.join("digy")
    } else {
        env::temp_dir().join("digy-ram")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.execution_timeout, Duration::from_secs(300));
        assert_eq!(config.base_limit, 100 * MB);
        assert_eq!(config.safety_margin, 256 * MB);
        assert_eq!(config.isolation_image, "python:3.11-slim");
        assert!(config.python.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (DIGY_BASE_DIR, "/srv/digy"),
            (DIGY_TIMEOUT_SECS, "12"),
            (DIGY_BASE_LIMIT_MB, "50"),
            (DIGY_PYTHON, "/usr/bin/python3.12"),
        ]))
        .unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/srv/digy"));
        assert_eq!(config.env_root(), PathBuf::from("/srv/digy/envs"));
        assert_eq!(config.execution_timeout, Duration::from_secs(12));
        assert_eq!(config.base_limit, 50 * MB);
        assert_eq!(config.python, Some(PathBuf::from("/usr/bin/python3.12")));
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = Config::from_lookup(lookup(&[(DIGY_ISOLATION_IMAGE, "  ")])).unwrap();
        assert_eq!(config.isolation_image, DEFAULT_ISOLATION_IMAGE);
    }

    #[test]
    fn test_invalid_number() {
        let result = Config::from_lookup(lookup(&[(DIGY_TIMEOUT_SECS, "soon")]));
        assert!(matches!(result, Err(DigyError::ConfigError(_))));
    }
}
