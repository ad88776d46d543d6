//! WebSocket echo route and session registry.
//!
//! Handshakes are answered directly with `101 Switching Protocols`; once
//! hyper hands over the upgraded connection the session echoes text and
//! binary frames until the peer closes or the registry is cleared.

use crate::listener::{build_response, WebSocketRoute};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{
    HeaderName, HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

/// Whether the request carries a complete RFC 6455 opening handshake.
pub fn is_websocket_handshake<B>(request: &Request<B>) -> bool {
    let headers = request.headers();
    let header = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    header(CONNECTION).is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"))
        && header(UPGRADE).is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
        && header(SEC_WEBSOCKET_KEY).is_some_and(|v| !v.is_empty())
        && header(SEC_WEBSOCKET_VERSION) == Some("13")
}

/// Open sessions, each with a close trigger.
#[derive(Debug, Default)]
pub struct WebSocketSessionRegistry {
    sessions: Mutex<HashMap<u64, oneshot::Sender<()>>>,
    next_id: AtomicU64,
}

impl WebSocketSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; the receiver fires when the session must close.
    pub fn register(&self) -> (u64, oneshot::Receiver<()>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.sessions.lock().insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, id: u64) {
        self.sessions.lock().remove(&id);
    }

    /// Close every open session.
    pub fn clear_session(&self) {
        let closed: Vec<_> = self.sessions.lock().drain().collect();
        if !closed.is_empty() {
            info!("Closing {} WebSocket sessions", closed.len());
        }
        for (_, close) in closed {
            let _ = close.send(());
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

/// Echoes every text or binary frame back to the sender.
#[derive(Debug, Clone)]
pub struct WebSocketEchoService {
    sessions: Arc<WebSocketSessionRegistry>,
}

impl WebSocketEchoService {
    pub fn new(sessions: Arc<WebSocketSessionRegistry>) -> Self {
        Self { sessions }
    }

}

impl WebSocketRoute for WebSocketEchoService {
    fn accepts(&self, request: &Request<Incoming>) -> bool {
        is_websocket_handshake(request)
    }

    fn upgrade(&self, mut request: Request<Incoming>) -> Response<Full<Bytes>> {
        let Some(key) = request.headers().get(SEC_WEBSOCKET_KEY) else {
            return build_response(StatusCode::BAD_REQUEST, "Missing Sec-WebSocket-Key");
        };
        let Ok(accept) = HeaderValue::from_str(&derive_accept_key(key.as_bytes())) else {
            return build_response(StatusCode::BAD_REQUEST, "Invalid Sec-WebSocket-Key");
        };
        let path = request.uri().path().to_string();

        // Registered before the 101 goes out, so a reset racing the upgrade
        // still reaches this session.
        let sessions = Arc::clone(&self.sessions);
        let (id, mut close) = sessions.register();
        let on_upgrade = hyper::upgrade::on(&mut request);
        tokio::spawn(async move {
            tokio::select! {
                upgraded = on_upgrade => match upgraded {
                    Ok(upgraded) => {
                        let ws = WebSocketStream::from_raw_socket(
                            TokioIo::new(upgraded),
                            Role::Server,
                            None,
                        )
                        .await;
                        debug!("WebSocket session {} opened on {}", id, path);
                        run_echo_session(ws, id, close).await;
                    }
                    Err(e) => debug!("WebSocket upgrade on {} failed: {}", path, e),
                },
                _ = &mut close => debug!("WebSocket session {} closed before upgrade", id),
            }
            sessions.unregister(id);
        });

        let mut response = build_response(StatusCode::SWITCHING_PROTOCOLS, Bytes::new());
        let headers = response.headers_mut();
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
        response
    }
}

async fn run_echo_session<S>(ws: WebSocketStream<S>, id: u64, mut close: oneshot::Receiver<()>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = &mut close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(msg)) if msg.is_text() || msg.is_binary() => {
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket session {} error: {}", id, e);
                    break;
                }
            }
        }
    }

    debug!("WebSocket session {} closed", id);
}
