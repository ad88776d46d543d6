//! Collaborators driven by the engine.
//!
//! # Module Structure
//!
//! - `resolver` - Mock resolution seam and the in-memory mock registry
//! - `ordering` - Per-mock response cycling counters
//! - `proxy` - Proxy server seam and intercepted session store
//! - `sse` - Event stream registry and heartbeat tasks
//! - `websocket` - WebSocket echo route and session registry
//! - `live_log` - Live traffic log events and broadcast feed

mod live_log;
mod ordering;
mod proxy;
mod resolver;
mod sse;
mod websocket;

pub use live_log::{InboundTraffic, LiveLogEvent, LiveLoggingHandler, OutboundTraffic, TrafficSink};
pub use ordering::MockOrderingCounters;
pub use proxy::{
    ActiveProxyMock, InterceptedExchange, PassiveProxyServer, ProxyError, ProxyServer,
    ProxySessionStore, RequestSignature,
};
pub use resolver::{
    MockCatalog, MockRegistry, MockResolver, Resolution, ResolvedResponse, ResolverFault,
};
pub use sse::{is_event_stream, SseService, EVENT_STREAM_CONTENT_TYPE};
pub use websocket::{is_websocket_handshake, WebSocketEchoService, WebSocketSessionRegistry};
