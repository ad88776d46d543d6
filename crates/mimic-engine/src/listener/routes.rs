//! Route table and filter chain.
//!
//! Routes are registered on a [`RouteTableBuilder`] while the listener is
//! being configured and frozen into an immutable [`RouteTable`] when it
//! starts. The table holds:
//!
//! - an optional WebSocket route, which receives complete upgrade handshakes
//!   before any filter or verb handler runs
//! - one handler per HTTP method, all bound to the wildcard path
//! - an ordered filter chain; every filter's `before` stage runs ahead of the
//!   handler and every `after` stage runs once the response is final,
//!   including timeout and not-found paths

use super::exchange::{Exchange, MockResponse};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("WebSocket route must be registered before any HTTP route")]
    WebSocketAfterHttp,
    #[error("A WebSocket route is already registered")]
    DuplicateWebSocket,
}

/// Handles requests for one HTTP method.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, exchange: &mut Exchange);
}

/// A pre/post stage applied to every HTTP request.
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    fn before(&self, _exchange: &mut Exchange) {}

    fn after(&self, _exchange: &mut Exchange) {}
}

/// Receives raw upgrade requests, independently of the verb handlers.
pub trait WebSocketRoute: Send + Sync {
    /// Whether this request should be handed to [`WebSocketRoute::upgrade`].
    fn accepts(&self, request: &Request<Incoming>) -> bool;

    /// Answer the handshake and take over the connection once hyper upgrades it.
    fn upgrade(&self, request: Request<Incoming>) -> Response<Full<Bytes>>;
}

#[derive(Default)]
pub struct RouteTableBuilder {
    web_socket: Option<Arc<dyn WebSocketRoute>>,
    handlers: HashMap<Method, Arc<dyn RouteHandler>>,
    filters: Vec<Arc<dyn Filter>>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the WebSocket route. Must happen before any HTTP route.
    pub fn web_socket(&mut self, route: Arc<dyn WebSocketRoute>) -> Result<(), RouteError> {
        if !self.handlers.is_empty() {
            return Err(RouteError::WebSocketAfterHttp);
        }
        if self.web_socket.is_some() {
            return Err(RouteError::DuplicateWebSocket);
        }
        self.web_socket = Some(route);
        Ok(())
    }

    /// Register the wildcard handler for `method`, replacing any previous one.
    pub fn route(&mut self, method: Method, handler: Arc<dyn RouteHandler>) {
        if self.handlers.insert(method.clone(), handler).is_some() {
            warn!("Replacing existing handler for {}", method);
        }
    }

    /// Append a filter to the chain.
    pub fn filter(&mut self, filter: Arc<dyn Filter>) {
        debug!("Installing filter '{}'", filter.name());
        self.filters.push(filter);
    }

    pub fn build(self) -> RouteTable {
        RouteTable {
            web_socket: self.web_socket,
            handlers: self.handlers,
            filters: self.filters,
        }
    }
}

/// Immutable routing state of a running listener.
pub struct RouteTable {
    web_socket: Option<Arc<dyn WebSocketRoute>>,
    handlers: HashMap<Method, Arc<dyn RouteHandler>>,
    filters: Vec<Arc<dyn Filter>>,
}

impl RouteTable {
    pub fn web_socket(&self) -> Option<&Arc<dyn WebSocketRoute>> {
        self.web_socket.as_ref()
    }

    /// Run the filter chain and the handler for one request.
    ///
    /// A handler that exceeds `timeout` is abandoned and the request answered
    /// with 503. Methods without a handler get 404.
    pub async fn handle(&self, mut exchange: Exchange, timeout: Duration) -> MockResponse {
        for filter in &self.filters {
            filter.before(&mut exchange);
        }

        match self.handlers.get(&exchange.request.method) {
            Some(handler) => {
                let handled = tokio::time::timeout(timeout, handler.handle(&mut exchange)).await;
                if handled.is_err() {
                    warn!(
                        "Request {} {} timed out after {}ms",
                        exchange.request.method,
                        exchange.request.path,
                        timeout.as_millis()
                    );
                    exchange.response.empty(StatusCode::SERVICE_UNAVAILABLE);
                }
            }
            None => exchange.response.empty(StatusCode::NOT_FOUND),
        }

        for filter in &self.filters {
            filter.after(&mut exchange);
        }

        exchange.response
    }

    /// Answer `status` without running a handler. Filters still see the
    /// request, so error answers carry the same headers as handled ones.
    pub fn reject(&self, mut exchange: Exchange, status: StatusCode) -> MockResponse {
        for filter in &self.filters {
            filter.before(&mut exchange);
        }
        exchange.response.empty(status);
        for filter in &self.filters {
            filter.after(&mut exchange);
        }
        exchange.response
    }
}
