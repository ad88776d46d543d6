//! Mock listener configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Native property that turns on CORS handling for the mock listener.
pub const ENABLE_CORS_PARAM: &str = "ENABLE_CORS";

/// Native property that starts the proxy subsystem alongside the mock listener.
pub const PROXY_SERVER_ENABLED_PARAM: &str = "PROXY_SERVER_ENABLED";

/// Largest accepted `maxThreads`; request permits are drawn from one semaphore.
pub const MAX_THREADS_LIMIT: usize = Semaphore::MAX_PERMITS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Port must be between 1 and 65535")]
    InvalidPort,
    #[error(
        "Thread pool bounds must be positive, min ({min}) <= max ({max}) and max <= {}",
        MAX_THREADS_LIMIT
    )]
    InvalidThreadPool { min: usize, max: usize },
    #[error("Request timeout must be greater than zero")]
    InvalidTimeout,
}

/// Per-start configuration of the mock listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockedServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of acceptor tasks sharing the listening socket
    #[serde(default = "default_min_threads")]
    pub min_threads: usize,
    /// Upper bound on concurrently executing requests
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    #[serde(default = "default_timeout_millis")]
    pub timeout_millis: u64,
    /// Feature flags such as `ENABLE_CORS` and `PROXY_SERVER_ENABLED`
    #[serde(default)]
    pub native_properties: HashMap<String, String>,
}

fn default_port() -> u16 {
    8001
}

fn default_min_threads() -> usize {
    10
}

fn default_max_threads() -> usize {
    100
}

fn default_timeout_millis() -> u64 {
    30_000
}

impl Default for MockedServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            min_threads: default_min_threads(),
            max_threads: default_max_threads(),
            timeout_millis: default_timeout_millis(),
            native_properties: HashMap::new(),
        }
    }
}

impl MockedServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set a native property, returning the updated config.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.native_properties.insert(name.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.min_threads == 0
            || self.min_threads > self.max_threads
            || self.max_threads > MAX_THREADS_LIMIT
        {
            return Err(ConfigError::InvalidThreadPool {
                min: self.min_threads,
                max: self.max_threads,
            });
        }
        if self.timeout_millis == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }

    fn property(&self, name: &str) -> Option<&str> {
        self.native_properties.get(name).map(String::as_str)
    }

    /// CORS is on only for the literal value `true`, ignoring case.
    pub fn is_cors_enabled(&self) -> bool {
        self.property(ENABLE_CORS_PARAM)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn is_proxy_server_enabled(&self) -> bool {
        self.property(PROXY_SERVER_ENABLED_PARAM).is_some_and(is_truthy)
    }
}

/// Interpret a flag value: `true`, `yes`, `on`, `y` and `t` are truthy,
/// ignoring case. Anything else, including `1`, is false.
pub fn is_truthy(value: &str) -> bool {
    ["true", "yes", "on", "y", "t"]
        .iter()
        .any(|truthy| value.eq_ignore_ascii_case(truthy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MockedServerConfig::default();
        assert_eq!(config.port, 8001);
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let config = MockedServerConfig::new(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort));
    }

    #[test]
    fn test_validate_rejects_inverted_pool() {
        let config = MockedServerConfig {
            min_threads: 20,
            max_threads: 4,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThreadPool { min: 20, max: 4 })
        );
    }

    #[test]
    fn test_validate_rejects_zero_threads_and_timeout() {
        let config = MockedServerConfig {
            min_threads: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreadPool { .. })
        ));

        let config = MockedServerConfig {
            timeout_millis: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTimeout));
    }

    #[test]
    fn test_validate_rejects_oversized_pool() {
        let config = MockedServerConfig {
            min_threads: 1,
            max_threads: usize::MAX,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThreadPool {
                min: 1,
                max: usize::MAX
            })
        );

        let config = MockedServerConfig {
            min_threads: 1,
            max_threads: MAX_THREADS_LIMIT,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feature_flags() {
        let config = MockedServerConfig::new(8001)
            .with_property(ENABLE_CORS_PARAM, "TRUE")
            .with_property(PROXY_SERVER_ENABLED_PARAM, "false");
        assert!(config.is_cors_enabled());
        assert!(!config.is_proxy_server_enabled());

        let config = MockedServerConfig::new(8001);
        assert!(!config.is_cors_enabled());
        assert!(!config.is_proxy_server_enabled());
    }

    #[test]
    fn test_cors_flag_requires_literal_true() {
        for value in ["yes", "on", "1", "y", "t", " true"] {
            let config = MockedServerConfig::new(8001).with_property(ENABLE_CORS_PARAM, value);
            assert!(!config.is_cors_enabled(), "{value} should not enable CORS");
        }
    }

    #[test]
    fn test_proxy_flag_accepts_short_forms() {
        for value in ["y", "T", "yes", "On", "true"] {
            let config =
                MockedServerConfig::new(8001).with_property(PROXY_SERVER_ENABLED_PARAM, value);
            assert!(config.is_proxy_server_enabled(), "{value} should enable the proxy");
        }
        let config = MockedServerConfig::new(8001).with_property(PROXY_SERVER_ENABLED_PARAM, "1");
        assert!(!config.is_proxy_server_enabled());
    }

    #[test]
    fn test_is_truthy() {
        for value in ["true", "True", "yes", "ON", "y", "T"] {
            assert!(is_truthy(value), "{value} should be truthy");
        }
        for value in ["false", "no", "0", "1", "", "enabled", " true "] {
            assert!(!is_truthy(value), "{value} should not be truthy");
        }
    }
}
