//! Listener run loop: bind, readiness handshake, serve and teardown.

use super::exchange::{Exchange, MockRequest};
use super::network::create_listener;
use super::routes::{RouteTable, RouteTableBuilder};
use crate::config::MockedServerConfig;
use crate::metrics;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Acceptor tasks are capped; more than this only adds contention on the socket.
pub const MAX_ACCEPTORS: usize = 256;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Listener did not report ready: {0}")]
    NotReady(String),
    #[error("Listener task failed during teardown: {0}")]
    Teardown(String),
}

/// Static listener configuration, applied before any route is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSettings {
    pub addr: SocketAddr,
    /// Acceptor tasks sharing the bound socket
    pub acceptors: usize,
    /// Requests allowed to execute at the same time
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
}

impl ListenerSettings {
    pub fn from_config(config: &MockedServerConfig) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)),
            acceptors: config.min_threads.clamp(1, MAX_ACCEPTORS),
            max_concurrent_requests: config.max_threads,
            request_timeout: config.request_timeout(),
        }
    }
}

struct ServeContext {
    routes: RouteTable,
    permits: Arc<Semaphore>,
    request_timeout: Duration,
}

/// A configured listener that has not started yet.
pub struct Listener {
    settings: ListenerSettings,
    routes: RouteTableBuilder,
}

impl Listener {
    pub fn new(settings: ListenerSettings) -> Self {
        Self {
            settings,
            routes: RouteTableBuilder::new(),
        }
    }

    pub fn routes_mut(&mut self) -> &mut RouteTableBuilder {
        &mut self.routes
    }

    /// Freeze the routes, bind and start serving.
    ///
    /// Returns once every acceptor is running, or fails if the socket cannot
    /// be bound or readiness is not reported within `ready_timeout`.
    pub async fn start(self, ready_timeout: Duration) -> Result<RunningListener, ListenerError> {
        let settings = self.settings;
        let ctx = Arc::new(ServeContext {
            routes: self.routes.build(),
            permits: Arc::new(Semaphore::new(
                settings
                    .max_concurrent_requests
                    .clamp(1, Semaphore::MAX_PERMITS),
            )),
            request_timeout: settings.request_timeout,
        });

        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut task = tokio::spawn(serve(
            settings.addr,
            settings.acceptors,
            ctx,
            ready_tx,
            shutdown_rx,
        ));

        match tokio::time::timeout(ready_timeout, ready_rx).await {
            Ok(Ok(Ok(local_addr))) => {
                info!(
                    "Mock listener ready on http://{} ({} acceptors, {} max concurrent requests)",
                    local_addr, settings.acceptors, settings.max_concurrent_requests
                );
                Ok(RunningListener {
                    local_addr,
                    shutdown: shutdown_tx,
                    task,
                })
            }
            Ok(Ok(Err(e))) => {
                let _ = task.await;
                Err(e)
            }
            Ok(Err(_)) => Err(ListenerError::NotReady(
                "listener task exited before reporting ready".to_string(),
            )),
            Err(_) => {
                let _ = shutdown_tx.send(true);
                task.abort();
                let _ = (&mut task).await;
                Err(ListenerError::NotReady(format!(
                    "no readiness signal within {}ms",
                    ready_timeout.as_millis()
                )))
            }
        }
    }
}

/// Handle to a serving listener.
pub struct RunningListener {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RunningListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, shut connections down gracefully and wait for the
    /// serve task to finish.
    ///
    /// The serve task completing is the teardown signal: the socket is closed
    /// and every connection task has ended. If that takes longer than
    /// `grace`, the task is aborted and joined before returning.
    pub async fn stop(mut self, grace: Duration) -> Result<(), ListenerError> {
        let _ = self.shutdown.send(true);

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ListenerError::Teardown(e.to_string())),
            Err(_) => {
                warn!(
                    "Listener on {} did not finish teardown within {}ms, aborting",
                    self.local_addr,
                    grace.as_millis()
                );
                self.task.abort();
                match self.task.await {
                    Err(e) if e.is_panic() => Err(ListenerError::Teardown(e.to_string())),
                    _ => Ok(()),
                }
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also ends the wait.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn serve(
    addr: SocketAddr,
    acceptors: usize,
    ctx: Arc<ServeContext>,
    ready: oneshot::Sender<Result<SocketAddr, ListenerError>>,
    shutdown: watch::Receiver<bool>,
) {
    let listener = match create_listener(addr) {
        Ok(listener) => Arc::new(listener),
        Err(source) => {
            let _ = ready.send(Err(ListenerError::Bind { addr, source }));
            return;
        }
    };
    let local_addr = listener.local_addr().unwrap_or(addr);

    let mut tasks = JoinSet::new();
    for id in 0..acceptors.clamp(1, MAX_ACCEPTORS) {
        tasks.spawn(accept_loop(
            id,
            Arc::clone(&listener),
            Arc::clone(&ctx),
            shutdown.clone(),
        ));
    }
    // Acceptors own the socket from here; it closes when the last one exits.
    drop(listener);

    if ready.send(Ok(local_addr)).is_err() {
        debug!("Readiness receiver for {} dropped", local_addr);
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!("Acceptor task on {} failed: {}", local_addr, e);
        }
    }
    info!("Mock listener on {} stopped", local_addr);
}

async fn accept_loop(
    id: usize,
    listener: Arc<TcpListener>,
    ctx: Arc<ServeContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    connections.spawn(serve_connection(
                        stream,
                        remote_addr,
                        Arc::clone(&ctx),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    error!("Accept error on acceptor {}: {}", id, e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
        while connections.try_join_next().is_some() {}
    }

    drop(listener);
    debug!(
        "Acceptor {} draining {} connections",
        id,
        connections.len()
    );
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    ctx: Arc<ServeContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let ctx = Arc::clone(&ctx);
        async move { handle_request(req, ctx).await }
    });

    let connection = http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades();
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(e) = result {
                debug!("Connection error from {}: {}", remote_addr, e);
            }
        }
        _ = wait_for_shutdown(&mut shutdown) => {
            connection.as_mut().graceful_shutdown();
            if let Err(e) = connection.as_mut().await {
                debug!("Connection error from {} during shutdown: {}", remote_addr, e);
            }
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    ctx: Arc<ServeContext>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if let Some(route) = ctx.routes.web_socket() {
        if route.accepts(&req) {
            return Ok(route.upgrade(req));
        }
    }

    let started = Instant::now();
    let deadline = started + ctx.request_timeout;
    let (parts, body) = req.into_parts();
    let exchange = Exchange::new(MockRequest::from_parts(parts));
    let method = exchange.request.method.clone();
    let path = exchange.request.path.clone();

    // Waiting for a permit and reading the body both count against the
    // request timeout; the handler gets whatever is left.
    let response = match timeout_at(deadline, Arc::clone(&ctx.permits).acquire_owned()).await {
        Ok(Ok(_permit)) => match timeout_at(deadline, body.collect()).await {
            Ok(Ok(collected)) => {
                let mut exchange = exchange;
                exchange.request.body = collected.to_bytes();
                let remaining = deadline.saturating_duration_since(Instant::now());
                ctx.routes.handle(exchange, remaining).await
            }
            Ok(Err(e)) => {
                debug!("Failed to read request body for {} {}: {}", method, path, e);
                ctx.routes.reject(exchange, StatusCode::BAD_REQUEST)
            }
            Err(_) => {
                warn!(
                    "Request body for {} {} not received within {}ms",
                    method,
                    path,
                    ctx.request_timeout.as_millis()
                );
                ctx.routes.reject(exchange, StatusCode::SERVICE_UNAVAILABLE)
            }
        },
        Ok(Err(_)) => ctx.routes.reject(exchange, StatusCode::SERVICE_UNAVAILABLE),
        Err(_) => {
            warn!(
                "No request slot free for {} {} within {}ms",
                method,
                path,
                ctx.request_timeout.as_millis()
            );
            ctx.routes.reject(exchange, StatusCode::SERVICE_UNAVAILABLE)
        }
    };
    metrics::record_request(&method, response.status, started.elapsed());

    Ok(response.into_hyper())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::Filter;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_settings_from_config() {
        let config = MockedServerConfig {
            port: 9100,
            min_threads: 3,
            max_threads: 12,
            timeout_millis: 750,
            ..Default::default()
        };
        let settings = ListenerSettings::from_config(&config);
        assert_eq!(settings.addr.port(), 9100);
        assert!(settings.addr.ip().is_unspecified());
        assert_eq!(settings.acceptors, 3);
        assert_eq!(settings.max_concurrent_requests, 12);
        assert_eq!(settings.request_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_acceptors_are_capped() {
        let config = MockedServerConfig {
            min_threads: 100_000,
            max_threads: 100_000,
            ..Default::default()
        };
        let settings = ListenerSettings::from_config(&config);
        assert_eq!(settings.acceptors, MAX_ACCEPTORS);
        assert_eq!(settings.max_concurrent_requests, 100_000);
    }

    fn local_settings() -> ListenerSettings {
        ListenerSettings {
            addr: "127.0.0.1:0".parse().unwrap(),
            acceptors: 2,
            max_concurrent_requests: 4,
            request_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_releases_port() {
        let running = Listener::new(local_settings())
            .start(Duration::from_secs(5))
            .await
            .unwrap();
        let addr = running.local_addr();
        assert_ne!(addr.port(), 0);

        running.stop(Duration::from_secs(3)).await.unwrap();

        // Teardown is complete, so the same port can be bound again.
        let settings = ListenerSettings {
            addr,
            ..local_settings()
        };
        let restarted = Listener::new(settings)
            .start(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(restarted.local_addr(), addr);
        restarted.stop(Duration::from_secs(3)).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_reported() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let settings = ListenerSettings {
            addr: occupied.local_addr().unwrap(),
            ..local_settings()
        };

        let result = Listener::new(settings).start(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ListenerError::Bind { .. })));
    }

    struct Stamp;

    impl Filter for Stamp {
        fn name(&self) -> &'static str {
            "stamp"
        }

        fn after(&self, exchange: &mut Exchange) {
            exchange.response.set_header("X-Stamped", "yes");
        }
    }

    async fn read_response(stream: &mut TcpStream) -> String {
        let mut buf = vec![0u8; 4096];
        let read = tokio::time::timeout(Duration::from_secs(3), stream.read(&mut buf))
            .await
            .expect("no response within 3s")
            .unwrap();
        String::from_utf8_lossy(&buf[..read]).to_ascii_lowercase()
    }

    #[tokio::test]
    async fn test_stalled_body_does_not_hold_the_only_slot() {
        let mut listener = Listener::new(ListenerSettings {
            acceptors: 1,
            max_concurrent_requests: 1,
            request_timeout: Duration::from_millis(200),
            ..local_settings()
        });
        listener.routes_mut().filter(Arc::new(Stamp));
        let running = listener.start(Duration::from_secs(5)).await.unwrap();
        let addr = running.local_addr();

        // Declares a body it never sends.
        let mut stalled = TcpStream::connect(addr).await.unwrap();
        stalled
            .write_all(b"POST /x HTTP/1.1\r\nHost: mimic\r\nContent-Length: 10\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut waiting = TcpStream::connect(addr).await.unwrap();
        waiting
            .write_all(b"GET /y HTTP/1.1\r\nHost: mimic\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let stalled_response = read_response(&mut stalled).await;
        assert!(stalled_response.starts_with("http/1.1 503"), "{stalled_response}");
        assert!(stalled_response.contains("x-stamped: yes"));

        // Answered (404, or 503 if the slot freed up too late), never left hanging.
        let waiting_response = read_response(&mut waiting).await;
        assert!(waiting_response.starts_with("http/1.1 "), "{waiting_response}");

        let mut next = TcpStream::connect(addr).await.unwrap();
        next.write_all(b"GET /z HTTP/1.1\r\nHost: mimic\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let next_response = read_response(&mut next).await;
        assert!(next_response.starts_with("http/1.1 404"), "{next_response}");
        assert!(next_response.contains("x-stamped: yes"));

        drop(stalled);
        running.stop(Duration::from_secs(3)).await.unwrap();
    }
}
