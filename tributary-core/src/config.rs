//! Engine configuration.
//!
//! Read from environment variables or deserialized from JSON:
//! - `TRIBUTARY_WORKER_THREADS`: threads in the default worker pool (default: available parallelism)
//! - `TRIBUTARY_HISTORY_CAPACITY`: finished runs kept by the execution history (default: 64)
//! - `TRIBUTARY_DEFAULT_TIMEOUT_MS`: timeout applied by `ExecutionHandle::wait_default` (default: none)

use std::env;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

const WORKER_THREADS: &str = "TRIBUTARY_WORKER_THREADS";
const HISTORY_CAPACITY: &str = "TRIBUTARY_HISTORY_CAPACITY";
const DEFAULT_TIMEOUT_MS: &str = "TRIBUTARY_DEFAULT_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker_threads: usize,

    pub history_capacity: usize,

    /// `None` waits forever.
    pub default_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            default_timeout_ms: None,
        }
    }
}

fn default_worker_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            worker_threads: parse(&lookup, WORKER_THREADS)?.unwrap_or(defaults.worker_threads),
            history_capacity: parse(&lookup, HISTORY_CAPACITY)?
                .unwrap_or(defaults.history_capacity),
            default_timeout_ms: parse(&lookup, DEFAULT_TIMEOUT_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::InvalidValue {
            key: "json",
            value: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::Zero {
                key: WORKER_THREADS,
            });
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn unset_variables_use_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.default_timeout(), None);
    }

    #[test]
    fn reads_every_variable() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("TRIBUTARY_WORKER_THREADS", "3"),
            ("TRIBUTARY_HISTORY_CAPACITY", " 10 "),
            ("TRIBUTARY_DEFAULT_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.default_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_garbage_and_zero_threads() {
        let err = EngineConfig::from_lookup(lookup(&[("TRIBUTARY_WORKER_THREADS", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "TRIBUTARY_WORKER_THREADS", .. }));

        let err =
            EngineConfig::from_lookup(lookup(&[("TRIBUTARY_WORKER_THREADS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Zero { .. }));
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = EngineConfig::from_json(r#"{"history_capacity": 5}"#).unwrap();
        assert_eq!(config.history_capacity, 5);
        assert_eq!(config.worker_threads, EngineConfig::default().worker_threads);
    }
}
