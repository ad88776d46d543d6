//! Admin API server.

use crate::admin_api::router::route_request;
use crate::config::MockedServerConfig;
use crate::engine::MockServerEngine;
use crate::services::LiveLoggingHandler;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Everything the admin handlers operate on.
pub struct AdminState {
    pub engine: Arc<MockServerEngine>,
    /// Configuration used by the start and restart endpoints
    pub config: MockedServerConfig,
    pub live_log: Arc<LiveLoggingHandler>,
}

/// Admin API server for the mock engine
pub struct AdminApiServer {
    addr: SocketAddr,
    state: Arc<AdminState>,
}

impl AdminApiServer {
    /// Create a new admin API server
    pub fn new(addr: SocketAddr, state: Arc<AdminState>) -> Self {
        Self { addr, state }
    }

    /// Run the admin API server
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Mimic Admin API listening on http://{}", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { route_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    debug!("Admin API connection error: {}", e);
                }
            });
        }
    }
}
