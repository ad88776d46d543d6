//! Lifecycle handlers: start, stop and restart the mock server.

use crate::admin_api::server::AdminState;
use crate::admin_api::types::*;
use crate::engine::ServerStartError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::warn;

/// POST /server/start
pub async fn handle_start(state: &AdminState) -> Response<Full<Bytes>> {
    match state.engine.start(&state.config).await {
        Ok(()) => json_response(StatusCode::OK, &state.engine.current_state()),
        Err(e) => start_error(e),
    }
}

/// POST /server/stop
pub async fn handle_stop(state: &AdminState) -> Response<Full<Bytes>> {
    match state.engine.shutdown().await {
        Ok(()) => json_response(StatusCode::OK, &state.engine.current_state()),
        Err(e) => {
            warn!("Admin stop failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// POST /server/restart - Stop (if running) and start again
pub async fn handle_restart(state: &AdminState) -> Response<Full<Bytes>> {
    if let Err(e) = state.engine.shutdown().await {
        // Shutdown always ends with the engine stopped.
        warn!("Shutdown during restart reported: {}", e);
    }
    handle_start(state).await
}

fn start_error(e: ServerStartError) -> Response<Full<Bytes>> {
    let status = match e {
        ServerStartError::AlreadyRunning(_) => StatusCode::CONFLICT,
        ServerStartError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("Admin start failed: {}", e);
    error_response(status, &e.to_string())
}
