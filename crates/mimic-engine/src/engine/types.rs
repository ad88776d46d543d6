//! Engine state and error types.

use crate::config::ConfigError;
use crate::listener::RouteError;
use crate::services::ProxyError;
use serde::{Deserialize, Serialize};

/// Observable state of the mock server process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    pub running: bool,
    /// Port of the last started server; kept after shutdown
    pub port: u16,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServerStartError {
    #[error("Invalid server configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Mock server is already running on port {0}")]
    AlreadyRunning(u16),
    #[error("Invalid route registration: {0}")]
    RouteOrder(#[from] RouteError),
    #[error("Failed to bind mock server port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Mock server did not become ready: {0}")]
    Readiness(String),
    #[error("Proxy server failed to start: {0}")]
    Proxy(#[source] ProxyError),
}

#[derive(Debug, thiserror::Error)]
pub enum ServerShutdownError {
    #[error("Mock server teardown failed: {0}")]
    Teardown(String),
    #[error("Proxy server failed to stop: {0}")]
    Proxy(#[source] ProxyError),
}
