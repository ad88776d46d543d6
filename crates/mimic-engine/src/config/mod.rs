//! Configuration types for the Mimic mock server.

mod admin;
mod mocks;
mod server;

use std::path::Path;

use serde::{Deserialize, Serialize};

// Re-export all types for library consumers
pub use admin::AdminConfig;
pub use mocks::{MockDefinition, MockReply};
pub use server::{
    is_truthy, ConfigError, MockedServerConfig, ENABLE_CORS_PARAM, MAX_THREADS_LIMIT,
    PROXY_SERVER_ENABLED_PARAM,
};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Mock listener settings, handed to the engine on every start
    #[serde(default)]
    pub server: MockedServerConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    /// Mock definitions served by the built-in registry
    #[serde(default)]
    pub mocks: Vec<MockDefinition>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.server.validate()?;

        if self.admin.enabled && self.admin.port == self.server.port {
            anyhow::bail!(
                "Admin API port {} collides with the mock server port",
                self.admin.port
            );
        }

        for (index, mock) in self.mocks.iter().enumerate() {
            mock.validate()
                .map_err(|e| anyhow::anyhow!("Invalid mock definition #{index}: {e}"))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
server:
  port: 8001
  minThreads: 2
  maxThreads: 16
  timeoutMillis: 5000
  nativeProperties:
    ENABLE_CORS: "true"
admin:
  port: 8000
mocks:
  - id: hello
    method: GET
    path: /hello
    responses:
      - status: 200
        headers:
          Content-Type: text/plain
        body: hi
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.server.min_threads, 2);
        assert_eq!(config.server.max_threads, 16);
        assert_eq!(config.server.timeout_millis, 5000);
        assert!(config.server.is_cors_enabled());
        assert!(!config.server.is_proxy_server_enabled());
        assert_eq!(config.admin.port, 8000);
        assert_eq!(config.mocks.len(), 1);
        assert_eq!(config.mocks[0].responses[0].body.as_deref(), Some("hi"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server, MockedServerConfig::default());
        assert!(config.mocks.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_admin_port_collision_rejected() {
        let yaml = r#"
server:
  port: 9000
admin:
  port: 9000
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn test_invalid_mock_rejected() {
        let yaml = r#"
mocks:
  - method: GET
    path: no-leading-slash
    responses:
      - status: 200
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("#0"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  port: 8123\n  nativeProperties:\n    PROXY_SERVER_ENABLED: \"yes\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 8123);
        assert!(config.server.is_proxy_server_enabled());
    }

    #[test]
    fn test_from_file_rejects_bad_thread_pool() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  minThreads: 8\n  maxThreads: 2").unwrap();

        assert!(Config::from_file(file.path()).is_err());
    }
}
