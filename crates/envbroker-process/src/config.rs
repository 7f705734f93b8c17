// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker configuration.

use std::path::PathBuf;

/// Processing engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL.
    pub database_url: String,
    /// Number of queue workers.
    pub workers: usize,
    /// Runtime version used when neither the request nor an account pin names one.
    pub default_runtime_version: String,
    /// JSON file with per-account runtime version pins.
    pub account_version_mapping: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `BROKER_DATABASE_URL`
    /// - `BROKER_DEFAULT_RUNTIME_VERSION`
    ///
    /// Optional (with defaults):
    /// - `BROKER_WORKERS` (default: 5)
    /// - `BROKER_ACCOUNT_VERSION_MAPPING` (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("BROKER_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("BROKER_DATABASE_URL"))?;
        let default_runtime_version = std::env::var("BROKER_DEFAULT_RUNTIME_VERSION")
            .map_err(|_| ConfigError::Missing("BROKER_DEFAULT_RUNTIME_VERSION"))?;

        let workers: usize = std::env::var("BROKER_WORKERS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("BROKER_WORKERS", "must be a positive integer"))?;
        if workers == 0 {
            return Err(ConfigError::Invalid(
                "BROKER_WORKERS",
                "must be a positive integer",
            ));
        }

        let account_version_mapping = std::env::var("BROKER_ACCOUNT_VERSION_MAPPING")
            .ok()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            database_url,
            workers,
            default_runtime_version,
            account_version_mapping,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("BROKER_DATABASE_URL", "sqlite::memory:");
        guard.set("BROKER_DEFAULT_RUNTIME_VERSION", "2.4.0");
        guard.remove("BROKER_WORKERS");
        guard.remove("BROKER_ACCOUNT_VERSION_MAPPING");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.default_runtime_version, "2.4.0");
        assert_eq!(config.workers, 5);
        assert!(config.account_version_mapping.is_none());
    }

    #[test]
    fn test_config_account_version_mapping() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("BROKER_DATABASE_URL", "sqlite::memory:");
        guard.set("BROKER_DEFAULT_RUNTIME_VERSION", "2.4.0");

        guard.set("BROKER_ACCOUNT_VERSION_MAPPING", "/etc/broker/versions.json");
        assert_eq!(
            Config::from_env().unwrap().account_version_mapping,
            Some(PathBuf::from("/etc/broker/versions.json"))
        );

        guard.set("BROKER_ACCOUNT_VERSION_MAPPING", "");
        assert!(Config::from_env().unwrap().account_version_mapping.is_none());
    }

    #[test]
    fn test_config_custom_workers() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("BROKER_DATABASE_URL", "sqlite://broker.db");
        guard.set("BROKER_DEFAULT_RUNTIME_VERSION", "2.4.0");
        guard.set("BROKER_WORKERS", "12");

        assert_eq!(Config::from_env().unwrap().workers, 12);
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.remove("BROKER_DATABASE_URL");
        guard.set("BROKER_DEFAULT_RUNTIME_VERSION", "2.4.0");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BROKER_DATABASE_URL")));
    }

    #[test]
    fn test_config_invalid_workers() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("BROKER_DATABASE_URL", "sqlite::memory:");
        guard.set("BROKER_DEFAULT_RUNTIME_VERSION", "2.4.0");

        guard.set("BROKER_WORKERS", "many");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("BROKER_WORKERS", _)
        ));

        guard.set("BROKER_WORKERS", "0");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("BROKER_WORKERS", _)
        ));
    }
}
