use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::compaction::MERGE_TOLERANCE_MS;

/// Storage engine settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding every market's log tree.
    pub root: PathBuf,
    /// Decimal places fast-log sizes are rounded to.
    pub fast_scale: u32,
    /// Time window for merging same-side same-price runs on the write path.
    pub merge_tolerance_ms: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let root = env_map
            .get("LOG_ROOT")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("LOG_ROOT".to_string()))?;

        let fast_scale = env_map
            .get("FAST_LOG_SCALE")
            .map(|s| s.as_str())
            .unwrap_or("2")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "FAST_LOG_SCALE".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;

        let merge_tolerance_ms = match env_map.get("MERGE_TOLERANCE_MS") {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                ConfigError::InvalidValue(
                    "MERGE_TOLERANCE_MS".to_string(),
                    "must be a valid i64".to_string(),
                )
            })?,
            None => MERGE_TOLERANCE_MS,
        };

        Ok(Config {
            root: PathBuf::from(root),
            fast_scale,
            merge_tolerance_ms,
        })
    }

    /// Settings rooted at `root` with every other value at its default.
    pub fn at_root(root: impl Into<PathBuf>) -> Self {
        Config {
            root: root.into(),
            fast_scale: 2,
            merge_tolerance_ms: MERGE_TOLERANCE_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("LOG_ROOT".to_string(), "/tmp/execlog".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/execlog"));
        assert_eq!(config.fast_scale, 2);
        assert_eq!(config.merge_tolerance_ms, 500);
    }

    #[test]
    fn test_missing_log_root() {
        let result = Config::from_env_map(HashMap::new());
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "LOG_ROOT"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_fast_scale() {
        let mut env_map = setup_required_env();
        env_map.insert("FAST_LOG_SCALE".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "FAST_LOG_SCALE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_merge_tolerance() {
        let mut env_map = setup_required_env();
        env_map.insert("MERGE_TOLERANCE_MS".to_string(), "soon".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MERGE_TOLERANCE_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
