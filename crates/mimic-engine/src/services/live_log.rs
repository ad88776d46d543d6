//! Live traffic logging feed.
//!
//! The traffic interceptor emits one [`LiveLogEvent`] per request direction.
//! [`LiveLoggingHandler`] fans events out to every subscriber (the admin
//! API's `/liveLogging` WebSocket) without ever blocking the request path.

use crate::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundTraffic {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub proxied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundTraffic {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub proxied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveLogEvent {
    Inbound(InboundTraffic),
    Outbound(OutboundTraffic),
}

impl LiveLogEvent {
    pub fn trace_id(&self) -> &str {
        match self {
            LiveLogEvent::Inbound(traffic) => &traffic.id,
            LiveLogEvent::Outbound(traffic) => &traffic.id,
        }
    }

    pub fn direction(&self) -> &'static str {
        match self {
            LiveLogEvent::Inbound(_) => "inbound",
            LiveLogEvent::Outbound(_) => "outbound",
        }
    }
}

/// Destination of live-log events. Implementations must not block.
pub trait TrafficSink: Send + Sync {
    fn broadcast(&self, event: LiveLogEvent);
}

/// Broadcast channel backed live-log feed.
#[derive(Debug, Clone)]
pub struct LiveLoggingHandler {
    sender: broadcast::Sender<Arc<LiveLogEvent>>,
}

impl Default for LiveLoggingHandler {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LiveLoggingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slow subscribers lag and skip events once `capacity` is exceeded.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LiveLogEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl TrafficSink for LiveLoggingHandler {
    fn broadcast(&self, event: LiveLogEvent) {
        metrics::record_live_log_event(event.direction());
        // No subscribers is not an error.
        if self.sender.send(Arc::new(event)).is_err() {
            trace!("Live log event dropped, no subscribers");
        }
    }
}
