//! Request/response model shared by filters and route handlers.
//!
//! Incoming hyper requests are buffered into a [`MockRequest`] once, so every
//! filter and handler in the chain can read headers and body without
//! consuming them. Handlers and filters write into a [`MockResponse`], which
//! is converted back into a hyper response after the post-stages have run.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::http::request::Parts;
use hyper::{HeaderMap, Method, Response, StatusCode};
use std::collections::HashMap;
use tracing::debug;

/// Buffered inbound request.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Request-scoped values set by filters (e.g. the trace id)
    attributes: HashMap<&'static str, String>,
}

impl MockRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            attributes: HashMap::new(),
        }
    }

    /// Request line and headers of a hyper request. The body is read
    /// separately, under the request deadline.
    pub fn from_parts(parts: Parts) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(String::from),
            headers: parts.headers,
            body: Bytes::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: &'static str, value: impl Into<String>) {
        self.attributes.insert(key, value.into());
    }
}

/// Response under construction.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

impl MockResponse {
    /// Set a header, replacing any previous value. Invalid names or values are dropped.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => debug!("Dropping invalid response header {}", name),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Finish with the given status and no body.
    pub fn empty(&mut self, status: StatusCode) {
        self.status = status;
        self.body = Bytes::new();
    }

    pub fn into_hyper(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// A request and the response being built for it.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: MockRequest,
    pub response: MockResponse,
}

impl Exchange {
    pub fn new(request: MockRequest) -> Self {
        Self {
            request,
            response: MockResponse::default(),
        }
    }
}

/// Build an HTTP response with the given status and body.
pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Build an HTTP response with headers.
///
/// Falls back to a bare 500 response if a header cannot be encoded.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder.body(Full::new(body.into())).unwrap_or_else(|_| {
        build_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })
}
