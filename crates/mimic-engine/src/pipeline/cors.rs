//! CORS preflight handler and origin filter.

use crate::listener::{Exchange, Filter, RouteHandler};
use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
};
use hyper::StatusCode;

/// Answers `OPTIONS` preflights by echoing what the browser asked for.
pub struct CorsPreflightHandler;

#[async_trait]
impl RouteHandler for CorsPreflightHandler {
    async fn handle(&self, exchange: &mut Exchange) {
        let request_headers = &exchange.request.headers;
        let response_headers = &mut exchange.response.headers;
        if let Some(value) = request_headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
            response_headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, value.clone());
        }
        if let Some(value) = request_headers.get(ACCESS_CONTROL_REQUEST_METHOD) {
            response_headers.insert(ACCESS_CONTROL_ALLOW_METHODS, value.clone());
        }
        exchange.response.status = StatusCode::OK;
        exchange.response.body = Bytes::from_static(b"OK");
    }
}

/// Allows any origin on every response.
pub struct CorsOriginFilter;

impl Filter for CorsOriginFilter {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn before(&self, exchange: &mut Exchange) {
        exchange
            .response
            .headers
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }
}
