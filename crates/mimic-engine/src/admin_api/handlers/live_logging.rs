//! GET /liveLogging - WebSocket feed of live traffic events.

use crate::admin_api::types::error_response;
use crate::listener::build_response;
use crate::services::{is_websocket_handshake, LiveLogEvent, LiveLoggingHandler};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

/// Upgrade the request and stream every live-log event as a JSON text frame.
pub fn handle_upgrade(
    mut req: Request<Incoming>,
    live_log: &Arc<LiveLoggingHandler>,
) -> Response<Full<Bytes>> {
    if !is_websocket_handshake(&req) {
        return error_response(StatusCode::BAD_REQUEST, "WebSocket upgrade required");
    }
    let Some(accept) = req
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .and_then(|key| HeaderValue::from_str(&derive_accept_key(key.as_bytes())).ok())
    else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid Sec-WebSocket-Key");
    };

    // Subscribe before answering so no event after the handshake is missed.
    let events = live_log.subscribe();
    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let ws =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await;
                forward_events(ws, events).await;
            }
            Err(e) => debug!("Live logging upgrade failed: {}", e),
        }
    });

    let mut response = build_response(StatusCode::SWITCHING_PROTOCOLS, Bytes::new());
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    response
}

async fn forward_events<S>(
    ws: WebSocketStream<S>,
    mut events: broadcast::Receiver<Arc<LiveLogEvent>>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    debug!("Live logging subscriber connected");
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(event.as_ref()) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to serialize live log event: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Live logging subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sink.close().await;
    debug!("Live logging subscriber disconnected");
}
