//! HTTP listener driven by the mock serving engine.
//!
//! # Module Structure
//!
//! - `exchange` - Buffered request/response model seen by filters and handlers
//! - `routes` - Route table, filter chain and the handler traits
//! - `server` - Bind, readiness handshake, serve loop and teardown
//! - `network` - Listening socket creation (SO_REUSEADDR)

mod exchange;
mod network;
mod routes;
mod server;

pub use exchange::{
    build_response, build_response_with_headers, Exchange, MockRequest, MockResponse,
};
pub use routes::{Filter, RouteError, RouteHandler, RouteTable, RouteTableBuilder, WebSocketRoute};
pub use server::{Listener, ListenerError, ListenerSettings, RunningListener};
