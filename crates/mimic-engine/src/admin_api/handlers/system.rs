//! System handlers: health, state, metrics.

use crate::admin_api::types::*;
use crate::engine::MockServerEngine;
use crate::listener::build_response_with_headers;
use crate::metrics;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// GET /health - Health check
pub fn handle_health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({"status": "ok"}))
}

/// GET /state - Current `{running, port}` of the mock server
pub fn handle_state(engine: &MockServerEngine) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &engine.current_state())
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics() -> Response<Full<Bytes>> {
    build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics::collect_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_handle_health() {
        let resp = handle_health();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_handle_state_before_start() {
        let engine = MockServerEngine::builder().build();
        let resp = handle_state(&engine);
        assert_eq!(resp.status(), StatusCode::OK);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["running"], false);
        assert_eq!(json["port"], 0);
    }

    #[test]
    fn test_handle_metrics() {
        let resp = handle_metrics();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .get("Content-Type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}
