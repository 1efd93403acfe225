/// runtime configuration read from the environment
///
use anyhow::{anyhow, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub const REDIS_DEFAULT_LOCATION: &str = "0.0.0.0:6379";
pub const REDIS_KEY_PREFIX: &str = "voter:";

pub const BACKEND_ENV: &str = "VOTER_STORE_BACKEND";
pub const REDIS_URL_ENV: &str = "REDIS_URL";
pub const KEY_PREFIX_ENV: &str = "VOTER_KEY_PREFIX";
pub const LOG_CONFIG_ENV: &str = "VOTER_LOG_CONFIG";
pub const LOG_LEVEL_ENV: &str = "VOTER_LOG_LEVEL";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    Memory,
    Cache,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "cache" | "redis" => Ok(BackendKind::Cache),
            other => Err(anyhow!("unknown voter store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: BackendKind,
    pub redis_address: String,
    pub key_prefix: String,
    pub log_config: Option<PathBuf>,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendKind::default(),
            redis_address: REDIS_DEFAULT_LOCATION.to_string(),
            key_prefix: REDIS_KEY_PREFIX.to_string(),
            log_config: None,
            log_level: LevelFilter::Info,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(backend) = get(BACKEND_ENV) {
            config.backend = backend.parse()?;
        }
        if let Some(address) = get(REDIS_URL_ENV) {
            config.redis_address = address;
        }
        if let Some(prefix) = get(KEY_PREFIX_ENV) {
            config.key_prefix = prefix;
        }
        config.log_config = get(LOG_CONFIG_ENV).map(PathBuf::from);
        if let Some(level) = get(LOG_LEVEL_ENV) {
            config.log_level = LevelFilter::from_str(&level)
                .map_err(|_| anyhow!("invalid log level: {}", level))?;
        }

        Ok(config)
    }

    /// the redis address as a connection url; bare host:port gets the redis scheme
    pub fn redis_url(&self) -> String {
        redis_url(&self.redis_address)
    }
}

pub fn redis_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.redis_url(), "redis://0.0.0.0:6379");
        assert_eq!(config.key_prefix, "voter:");
    }

    #[test]
    fn from_lookup() {
        let config = Config::from_lookup(lookup(&[
            (BACKEND_ENV, "Redis"),
            (REDIS_URL_ENV, "redis://cache.local:6380/2"),
            (KEY_PREFIX_ENV, "test-voter:"),
            (LOG_CONFIG_ENV, "config/log4rs.yaml"),
            (LOG_LEVEL_ENV, "debug"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Cache);
        assert_eq!(config.redis_url(), "redis://cache.local:6380/2");
        assert_eq!(config.key_prefix, "test-voter:");
        assert_eq!(config.log_config, Some(PathBuf::from("config/log4rs.yaml")));
        assert_eq!(config.log_level, LevelFilter::Debug);
    }

    #[test]
    fn empty_values_are_unset() {
        let config = Config::from_lookup(lookup(&[(REDIS_URL_ENV, ""), (BACKEND_ENV, " ")])).unwrap();
        assert_eq!(config.redis_address, REDIS_DEFAULT_LOCATION);
        assert_eq!(config.backend, BackendKind::Memory);
    }

    #[test]
    fn bad_values() {
        assert!(Config::from_lookup(lookup(&[(BACKEND_ENV, "postgres")])).is_err());
        assert!(Config::from_lookup(lookup(&[(LOG_LEVEL_ENV, "loud")])).is_err());
    }
}
