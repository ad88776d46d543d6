//! MockServerEngine - lifecycle management for the mock listener.
//!
//! Starting configures a fresh listener (WebSocket route first, then CORS,
//! the verb handlers and the traffic logging filter), waits until it reports
//! ready and only then publishes `{running: true}`. Shutdown walks the same
//! path backwards and always leaves the engine not running.

use super::state::SharedServerState;
use super::types::{ServerShutdownError, ServerStartError, ServerState};
use crate::config::{MockDefinition, MockedServerConfig};
use crate::listener::{Listener, ListenerError, ListenerSettings, RunningListener};
use crate::pipeline::{
    CorsOriginFilter, CorsPreflightHandler, DispatchHandler, TrafficInterceptor, DISPATCH_VERBS,
};
use crate::services::{
    LiveLoggingHandler, MockCatalog, MockOrderingCounters, MockRegistry, MockResolver,
    PassiveProxyServer, ProxyServer, ProxySessionStore, SseService, TrafficSink,
    WebSocketEchoService, WebSocketSessionRegistry,
};
use hyper::Method;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for listener teardown before the serve task is aborted.
pub const TEARDOWN_GRACE: Duration = Duration::from_secs(3);

/// Upper bound on waiting for a started listener to report ready.
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a single mock listener and the subsystems attached to it.
pub struct MockServerEngine {
    state: SharedServerState,
    /// Serialises start/shutdown; holds the listener while it runs
    lifecycle: AsyncMutex<Option<RunningListener>>,
    resolver: Arc<dyn MockResolver>,
    catalog: Arc<dyn MockCatalog>,
    proxy_server: Arc<dyn ProxyServer>,
    traffic_sink: Arc<dyn TrafficSink>,
    sse: Arc<SseService>,
    web_sockets: Arc<WebSocketSessionRegistry>,
    proxy_sessions: Arc<ProxySessionStore>,
    ordering: Arc<MockOrderingCounters>,
}

impl MockServerEngine {
    pub fn builder() -> MockServerEngineBuilder {
        MockServerEngineBuilder::default()
    }

    /// Start the mock server with `config`.
    pub async fn start(&self, config: &MockedServerConfig) -> Result<(), ServerStartError> {
        let mut running = self.lifecycle.lock().await;
        if running.is_some() {
            return Err(ServerStartError::AlreadyRunning(self.state.snapshot().port));
        }
        config.validate()?;

        info!("Starting mock server on port {}", config.port);
        let mut listener = self.init_server_config(config);
        self.build_web_socket_endpoints(&mut listener)?;
        self.handle_cors(config, &mut listener);
        self.build_global_http_endpoints_handler(&mut listener);
        self.apply_traffic_logging(&mut listener);

        let handle = self.init_server(listener, config).await?;
        *running = Some(handle);
        info!("Mock server started on port {}", config.port);
        Ok(())
    }

    /// Stop the mock server. Safe to call when it was never started.
    ///
    /// Every step is attempted; the first failure is returned.
    pub async fn shutdown(&self) -> Result<(), ServerShutdownError> {
        let mut running = self.lifecycle.lock().await;
        let mut first_error = None;

        self.sse.interrupt_all_heartbeats();

        if let Some(listener) = running.take() {
            let addr = listener.local_addr();
            debug!("Stopping mock listener on {}", addr);
            match listener.stop(TEARDOWN_GRACE).await {
                Ok(()) => debug!("Mock listener on {} torn down", addr),
                Err(e) => {
                    error!("Mock listener teardown failed: {}", e);
                    first_error = Some(ServerShutdownError::Teardown(e.to_string()));
                }
            }
        }

        self.state.mark_stopped();
        self.clear_state();

        if let Err(e) = self.proxy_server.shutdown().await {
            error!("Proxy server shutdown failed: {}", e);
            first_error.get_or_insert(ServerShutdownError::Proxy(e));
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Mock server stopped");
                Ok(())
            }
        }
    }

    /// Snapshot of `{running, port}`. Never waits on a lifecycle transition.
    pub fn current_state(&self) -> ServerState {
        self.state.snapshot()
    }

    /// Address the running listener is bound to. `None` while stopped or
    /// while a start/shutdown is in progress.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle
            .try_lock()
            .ok()
            .and_then(|running| running.as_ref().map(RunningListener::local_addr))
    }

    /// Reset every subsystem that keeps per-run state. Idempotent.
    pub fn clear_state(&self) {
        self.web_sockets.clear_session();
        self.proxy_sessions.clear_all_sessions();
        self.ordering.clear_state();
        self.sse.clear_state();
        debug!("Cleared mock server state");
    }

    pub fn sse(&self) -> &Arc<SseService> {
        &self.sse
    }

    pub fn web_socket_sessions(&self) -> &Arc<WebSocketSessionRegistry> {
        &self.web_sockets
    }

    pub fn proxy_sessions(&self) -> &Arc<ProxySessionStore> {
        &self.proxy_sessions
    }

    pub fn ordering_counters(&self) -> &Arc<MockOrderingCounters> {
        &self.ordering
    }

    /// Static listener configuration; applied before any route exists.
    fn init_server_config(&self, config: &MockedServerConfig) -> Listener {
        let settings = ListenerSettings::from_config(config);
        debug!(
            "Listener settings: {} acceptors, {} max concurrent requests, {}ms timeout",
            settings.acceptors,
            settings.max_concurrent_requests,
            settings.request_timeout.as_millis()
        );
        Listener::new(settings)
    }

    fn build_web_socket_endpoints(&self, listener: &mut Listener) -> Result<(), ServerStartError> {
        let route = WebSocketEchoService::new(Arc::clone(&self.web_sockets));
        listener.routes_mut().web_socket(Arc::new(route))?;
        Ok(())
    }

    fn handle_cors(&self, config: &MockedServerConfig, listener: &mut Listener) {
        if !config.is_cors_enabled() {
            return;
        }
        debug!("CORS enabled");
        let routes = listener.routes_mut();
        routes.route(Method::OPTIONS, Arc::new(CorsPreflightHandler));
        routes.filter(Arc::new(CorsOriginFilter));
    }

    fn build_global_http_endpoints_handler(&self, listener: &mut Listener) {
        let routes = listener.routes_mut();
        for verb in DISPATCH_VERBS {
            let handler = DispatchHandler::new(verb.clone(), Arc::clone(&self.resolver));
            routes.route(verb, Arc::new(handler));
        }
    }

    fn apply_traffic_logging(&self, listener: &mut Listener) {
        let interceptor = TrafficInterceptor::new(Arc::clone(&self.traffic_sink));
        listener.routes_mut().filter(Arc::new(interceptor));
    }

    /// Reset state, start the listener and commit `{running: true}` once it
    /// is ready (and the proxy is up, when enabled).
    async fn init_server(
        &self,
        listener: Listener,
        config: &MockedServerConfig,
    ) -> Result<RunningListener, ServerStartError> {
        self.clear_state();

        let handle = listener
            .start(READINESS_TIMEOUT)
            .await
            .map_err(|e| match e {
                ListenerError::Bind { addr, source } => ServerStartError::Bind {
                    port: addr.port(),
                    source,
                },
                ListenerError::NotReady(reason) | ListenerError::Teardown(reason) => {
                    ServerStartError::Readiness(reason)
                }
            })?;

        if config.is_proxy_server_enabled() {
            if let Err(e) = self.init_proxy_server(config).await {
                if let Err(stop) = handle.stop(TEARDOWN_GRACE).await {
                    warn!("Failed to stop listener after proxy start failure: {}", stop);
                }
                return Err(e);
            }
        }

        self.state.mark_running(config.port);
        Ok(handle)
    }

    async fn init_proxy_server(&self, config: &MockedServerConfig) -> Result<(), ServerStartError> {
        let active_mocks = self.catalog.active_mocks();
        debug!("Starting proxy server with {} active mocks", active_mocks.len());
        self.proxy_server
            .start(config, active_mocks)
            .await
            .map_err(ServerStartError::Proxy)
    }
}

/// Builder wiring the engine's collaborators; anything left unset gets the
/// in-process default.
#[derive(Default)]
pub struct MockServerEngineBuilder {
    mocks: Vec<MockDefinition>,
    resolver: Option<Arc<dyn MockResolver>>,
    catalog: Option<Arc<dyn MockCatalog>>,
    proxy_server: Option<Arc<dyn ProxyServer>>,
    traffic_sink: Option<Arc<dyn TrafficSink>>,
    sse: Option<Arc<SseService>>,
}

impl MockServerEngineBuilder {
    /// Mocks served by the default registry.
    pub fn mocks(mut self, mocks: Vec<MockDefinition>) -> Self {
        self.mocks = mocks;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn MockResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn MockCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn proxy_server(mut self, proxy_server: Arc<dyn ProxyServer>) -> Self {
        self.proxy_server = Some(proxy_server);
        self
    }

    pub fn traffic_sink(mut self, sink: Arc<dyn TrafficSink>) -> Self {
        self.traffic_sink = Some(sink);
        self
    }

    pub fn sse(mut self, sse: Arc<SseService>) -> Self {
        self.sse = Some(sse);
        self
    }

    pub fn build(self) -> MockServerEngine {
        let ordering = Arc::new(MockOrderingCounters::new());
        let registry = Arc::new(MockRegistry::new(self.mocks, Arc::clone(&ordering)));

        let resolver: Arc<dyn MockResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => registry.clone(),
        };
        let catalog: Arc<dyn MockCatalog> = match self.catalog {
            Some(catalog) => catalog,
            None => registry,
        };
        let proxy_server: Arc<dyn ProxyServer> = match self.proxy_server {
            Some(proxy_server) => proxy_server,
            None => Arc::new(PassiveProxyServer::new()),
        };
        let traffic_sink: Arc<dyn TrafficSink> = match self.traffic_sink {
            Some(sink) => sink,
            None => Arc::new(LiveLoggingHandler::new()),
        };

        MockServerEngine {
            state: SharedServerState::new(),
            lifecycle: AsyncMutex::new(None),
            resolver,
            catalog,
            proxy_server,
            traffic_sink,
            sse: self.sse.unwrap_or_default(),
            web_sockets: Arc::new(WebSocketSessionRegistry::new()),
            proxy_sessions: Arc::new(ProxySessionStore::new()),
            ordering,
        }
    }
}
