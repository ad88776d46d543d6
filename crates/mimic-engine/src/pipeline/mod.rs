//! Request pipeline installed on the mock listener.
//!
//! # Module Structure
//!
//! - `dispatch` - One wildcard handler per verb, backed by the resolver
//! - `cors` - Optional preflight handler and allow-origin filter
//! - `traffic` - Live traffic logging filter and its headers

mod cors;
mod dispatch;
mod traffic;

pub use cors::{CorsOriginFilter, CorsPreflightHandler};
pub use dispatch::{is_web_socket_upgrade_request, DispatchHandler, DISPATCH_VERBS};
pub use traffic::{TrafficInterceptor, PROXY_INTERCEPT_HEADER, TRACE_ID_HEADER};
