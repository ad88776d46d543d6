//! Live traffic logging filter.
//!
//! Every request that is not marked as proxy-internal gets a fresh trace id,
//! exposed to the client through [`TRACE_ID_HEADER`]. The filter emits an
//! inbound event before the handler runs and an outbound event once the
//! response is final, so for any trace id the inbound event is always
//! broadcast first.

use crate::listener::{Exchange, Filter};
use crate::services::{is_event_stream, InboundTraffic, LiveLogEvent, OutboundTraffic, TrafficSink};
use bytes::Bytes;
use chrono::Utc;
use hyper::HeaderMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Response header carrying the trace id of a logged request.
pub const TRACE_ID_HEADER: &str = "X-Mimic-Trace-Id";

/// Present on requests forwarded by the proxy subsystem; such requests are
/// logged by the proxy itself.
pub const PROXY_INTERCEPT_HEADER: &str = "X-Mimic-Proxy-Intercept";

/// Request attribute holding the trace id.
const TRACE_ID_ATTRIBUTE: &str = "trace-id";

pub struct TrafficInterceptor {
    sink: Arc<dyn TrafficSink>,
}

impl TrafficInterceptor {
    pub fn new(sink: Arc<dyn TrafficSink>) -> Self {
        Self { sink }
    }
}

impl Filter for TrafficInterceptor {
    fn name(&self) -> &'static str {
        "traffic-logging"
    }

    fn before(&self, exchange: &mut Exchange) {
        if exchange.request.has_header(PROXY_INTERCEPT_HEADER) {
            return;
        }

        let trace_id = Uuid::new_v4().to_string();
        exchange
            .request
            .set_attribute(TRACE_ID_ATTRIBUTE, trace_id.clone());
        exchange.response.set_header(TRACE_ID_HEADER, &trace_id);

        let request = &exchange.request;
        let mut headers = header_snapshot(&request.headers);
        headers.insert(TRACE_ID_HEADER.to_string(), trace_id.clone());

        self.sink.broadcast(LiveLogEvent::Inbound(InboundTraffic {
            id: trace_id,
            timestamp: Utc::now(),
            method: request.method.to_string(),
            url: request.path.clone(),
            headers,
            body: body_text(&request.body),
            proxied: false,
        }));
    }

    fn after(&self, exchange: &mut Exchange) {
        if exchange.request.has_header(PROXY_INTERCEPT_HEADER)
            || is_event_stream(exchange.response.content_type())
        {
            return;
        }
        let Some(trace_id) = exchange.request.attribute(TRACE_ID_ATTRIBUTE) else {
            return;
        };

        let response = &exchange.response;
        let mut headers = header_snapshot(&response.headers);
        headers.insert(TRACE_ID_HEADER.to_string(), trace_id.to_string());

        self.sink.broadcast(LiveLogEvent::Outbound(OutboundTraffic {
            id: trace_id.to_string(),
            timestamp: Utc::now(),
            status: response.status.as_u16(),
            headers,
            body: body_text(&response.body),
            proxied: false,
        }));
    }
}

/// Headers keyed by title-cased name; repeated values are joined with ", ".
fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut snapshot: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        snapshot
            .entry(title_case(name.as_str()))
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    snapshot
}

fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn body_text(body: &Bytes) -> Option<String> {
    if body.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(body).into_owned())
    }
}
