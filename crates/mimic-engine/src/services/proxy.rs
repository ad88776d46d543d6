//! Proxy subsystem seams.
//!
//! The engine only drives the proxy through [`ProxyServer`]: it is started
//! with the active-mock projection after the main listener is ready, and
//! stopped as the last step of shutdown. [`ProxySessionStore`] keeps the
//! exchanges the proxy intercepted and is wiped with the rest of the
//! cross-subsystem state.

use crate::config::MockedServerConfig;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Projection of a mock the proxy should intercept instead of forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveProxyMock {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_path: Option<String>,
    pub method: String,
}

impl ActiveProxyMock {
    pub fn new(method: &str, path: &str, context_path: Option<&str>) -> Self {
        Self {
            path: path.to_string(),
            context_path: context_path.map(String::from),
            method: method.to_uppercase(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Proxy server failed to start: {0}")]
    Start(String),
    #[error("Proxy server failed to stop: {0}")]
    Stop(String),
}

#[async_trait]
pub trait ProxyServer: Send + Sync {
    async fn start(
        &self,
        config: &MockedServerConfig,
        active_mocks: Vec<ActiveProxyMock>,
    ) -> Result<(), ProxyError>;

    async fn shutdown(&self) -> Result<(), ProxyError>;
}

/// Proxy that forwards nothing and only remembers what it was started with.
///
/// Used when no forwarding proxy is wired in, so the engine's proxy steps
/// still run and stay observable.
#[derive(Debug, Default)]
pub struct PassiveProxyServer {
    active: Mutex<Option<Vec<ActiveProxyMock>>>,
}

impl PassiveProxyServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Mocks handed over by the most recent start, if still running.
    pub fn active_mocks(&self) -> Option<Vec<ActiveProxyMock>> {
        self.active.lock().clone()
    }
}

#[async_trait]
impl ProxyServer for PassiveProxyServer {
    async fn start(
        &self,
        config: &MockedServerConfig,
        active_mocks: Vec<ActiveProxyMock>,
    ) -> Result<(), ProxyError> {
        info!(
            "Passive proxy started for port {} with {} intercepted mocks",
            config.port,
            active_mocks.len()
        );
        *self.active.lock() = Some(active_mocks);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ProxyError> {
        if self.active.lock().take().is_some() {
            debug!("Passive proxy stopped");
        }
        Ok(())
    }
}

/// Key of an intercepted request.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestSignature {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
}

impl RequestSignature {
    pub fn new(method: &str, path: &str, query: Option<&str>) -> Self {
        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            query: query.map(|s| s.to_string()),
        }
    }
}

/// Response the proxy served for an intercepted request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptedExchange {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Unix timestamp in seconds
    pub timestamp_secs: u64,
}

/// Intercepted exchanges grouped by request signature.
#[derive(Debug, Default)]
pub struct ProxySessionStore {
    sessions: RwLock<HashMap<RequestSignature, Vec<InterceptedExchange>>>,
}

impl ProxySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, signature: RequestSignature, exchange: InterceptedExchange) {
        self.sessions
            .write()
            .entry(signature)
            .or_default()
            .push(exchange);
    }

    pub fn sessions(&self, signature: &RequestSignature) -> Vec<InterceptedExchange> {
        self.sessions
            .read()
            .get(signature)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of distinct request signatures.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn clear_all_sessions(&self) {
        let mut sessions = self.sessions.write();
        if !sessions.is_empty() {
            debug!("Clearing {} proxy sessions", sessions.len());
        }
        sessions.clear();
    }
}
