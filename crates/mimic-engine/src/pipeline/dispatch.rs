//! Verb dispatch: hands every mock request to the resolver.

use crate::listener::{Exchange, RouteHandler};
use crate::metrics;
use crate::services::{MockResolver, Resolution};
use async_trait::async_trait;
use hyper::header::{SEC_WEBSOCKET_KEY, UPGRADE};
use hyper::{HeaderMap, Method, StatusCode};
use std::sync::Arc;
use tracing::{debug, error};

/// Methods served by the mock listener.
pub const DISPATCH_VERBS: [Method; 6] = [
    Method::HEAD,
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
];

/// `Upgrade` and `Sec-WebSocket-Key` both present, and `Upgrade` is `websocket`.
pub fn is_web_socket_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(SEC_WEBSOCKET_KEY)
        && headers
            .get(UPGRADE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Wildcard handler for one verb.
pub struct DispatchHandler {
    verb: Method,
    resolver: Arc<dyn MockResolver>,
}

impl DispatchHandler {
    pub fn new(verb: Method, resolver: Arc<dyn MockResolver>) -> Self {
        Self { verb, resolver }
    }
}

#[async_trait]
impl RouteHandler for DispatchHandler {
    async fn handle(&self, exchange: &mut Exchange) {
        // Upgrade probes that reach a verb handler are acknowledged without
        // consulting any mock.
        if self.verb == Method::GET && is_web_socket_upgrade_request(&exchange.request.headers) {
            debug!("Acknowledging WebSocket probe on {}", exchange.request.path);
            exchange.response.empty(StatusCode::OK);
            return;
        }

        match self.resolver.resolve(&exchange.request).await {
            Ok(Resolution::Found(resolved)) => {
                exchange.response.status = resolved.status;
                // Replaces headers already set under the same name.
                exchange.response.headers.extend(resolved.headers);
                exchange.response.body = resolved.body;
            }
            Ok(Resolution::NotFound) => exchange.response.empty(StatusCode::NOT_FOUND),
            Err(fault) => {
                error!(
                    "Failed to resolve {} {}: {}",
                    self.verb, exchange.request.path, fault
                );
                metrics::record_resolver_fault();
                exchange.response.empty(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }
}
