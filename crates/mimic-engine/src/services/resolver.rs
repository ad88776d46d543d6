//! Mock resolution.
//!
//! The dispatch pipeline asks a [`MockResolver`] for the response to every
//! non-probe request. [`MockRegistry`] is the in-memory implementation backed
//! by the mock definitions from the configuration file.

use super::ordering::MockOrderingCounters;
use super::proxy::ActiveProxyMock;
use crate::config::MockDefinition;
use crate::listener::MockRequest;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Response produced by a matching mock.
#[derive(Debug, Clone)]
pub struct ResolvedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Found(ResolvedResponse),
    NotFound,
}

/// Failure while evaluating mocks for a request.
#[derive(Debug, Error)]
#[error("Mock resolution failed: {message}")]
pub struct ResolverFault {
    message: String,
}

impl ResolverFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
pub trait MockResolver: Send + Sync {
    async fn resolve(&self, request: &MockRequest) -> Result<Resolution, ResolverFault>;
}

/// Source of the mocks the proxy should intercept.
pub trait MockCatalog: Send + Sync {
    fn active_mocks(&self) -> Vec<ActiveProxyMock>;
}

/// In-memory mock store.
///
/// Matches on method (case-insensitive) and exact effective path; the first
/// definition in file order wins. Mocks with several responses cycle through
/// them using the shared ordering counters.
#[derive(Debug)]
pub struct MockRegistry {
    mocks: Vec<MockDefinition>,
    counters: Arc<MockOrderingCounters>,
}

impl MockRegistry {
    pub fn new(mocks: Vec<MockDefinition>, counters: Arc<MockOrderingCounters>) -> Self {
        Self { mocks, counters }
    }

    pub fn counters(&self) -> &Arc<MockOrderingCounters> {
        &self.counters
    }

    fn find(&self, request: &MockRequest) -> Option<&MockDefinition> {
        self.mocks.iter().find(|mock| {
            mock.method.eq_ignore_ascii_case(request.method.as_str())
                && mock.effective_path() == request.path
        })
    }
}

#[async_trait]
impl MockResolver for MockRegistry {
    async fn resolve(&self, request: &MockRequest) -> Result<Resolution, ResolverFault> {
        let Some(mock) = self.find(request) else {
            return Ok(Resolution::NotFound);
        };

        let key = mock.ordering_key();
        let index = self.counters.next_index(&key, mock.responses.len());
        let Some(reply) = mock.responses.get(index) else {
            return Err(ResolverFault::new(format!("mock '{}' has no responses", key)));
        };
        debug!("Mock '{}' matched, serving response #{}", key, index);

        let status = StatusCode::from_u16(reply.status).map_err(|e| {
            ResolverFault::new(format!("mock '{}' has invalid status: {}", key, e))
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &reply.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ResolverFault::new(format!("mock '{}' has invalid header name: {}", key, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ResolverFault::new(format!("mock '{}' has invalid header value: {}", key, e))
            })?;
            headers.append(name, value);
        }

        Ok(Resolution::Found(ResolvedResponse {
            status,
            headers,
            body: reply.body.clone().map(Bytes::from).unwrap_or_default(),
        }))
    }
}

impl MockCatalog for MockRegistry {
    fn active_mocks(&self) -> Vec<ActiveProxyMock> {
        self.mocks
            .iter()
            .map(|mock| {
                ActiveProxyMock::new(&mock.method, &mock.path, mock.context_path.as_deref())
            })
            .collect()
    }
}
