//! Route dispatch logic for the Admin API.

use crate::admin_api::handlers::{lifecycle, live_logging, system};
use crate::admin_api::server::AdminState;
use crate::admin_api::types::not_found;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Admin endpoints
#[derive(Debug, PartialEq, Eq)]
enum AdminRoute {
    Health,
    State,
    Metrics,
    Start,
    Stop,
    Restart,
    LiveLogging,
}

impl AdminRoute {
    fn parse(method: &Method, path: &str) -> Option<Self> {
        match (method, path.trim_end_matches('/')) {
            (&Method::GET, "/health") => Some(AdminRoute::Health),
            (&Method::GET, "/state") => Some(AdminRoute::State),
            (&Method::GET, "/metrics") => Some(AdminRoute::Metrics),
            (&Method::POST, "/server/start") => Some(AdminRoute::Start),
            (&Method::POST, "/server/stop") => Some(AdminRoute::Stop),
            (&Method::POST, "/server/restart") => Some(AdminRoute::Restart),
            (&Method::GET, "/liveLogging") => Some(AdminRoute::LiveLogging),
            _ => None,
        }
    }
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    state: Arc<AdminState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    debug!("Admin API: {} {}", req.method(), req.uri().path());

    let response = match AdminRoute::parse(req.method(), req.uri().path()) {
        Some(AdminRoute::Health) => system::handle_health(),
        Some(AdminRoute::State) => system::handle_state(&state.engine),
        Some(AdminRoute::Metrics) => system::handle_metrics(),
        Some(AdminRoute::Start) => lifecycle::handle_start(&state).await,
        Some(AdminRoute::Stop) => lifecycle::handle_stop(&state).await,
        Some(AdminRoute::Restart) => lifecycle::handle_restart(&state).await,
        Some(AdminRoute::LiveLogging) => live_logging::handle_upgrade(req, &state.live_log),
        None => not_found(),
    };
    Ok(response)
}
