//! Mimic - mock server entry point.
//!
//! Loads the configuration, starts the mock server and the admin API, and
//! shuts the engine down on Ctrl-C.

use clap::Parser;
use mimic_engine::admin_api::{AdminApiServer, AdminState};
use mimic_engine::config::{Config, ENABLE_CORS_PARAM, PROXY_SERVER_ENABLED_PARAM};
use mimic_engine::services::LiveLoggingHandler;
use mimic_engine::MockServerEngine;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mimic", version, about = "Service-virtualization mock server")]
struct Args {
    /// Path to YAML configuration file
    #[arg(short, long, env = "MIMIC_CONFIG")]
    config: Option<PathBuf>,

    /// Mock server port
    #[arg(short, long, env = "MIMIC_PORT")]
    port: Option<u16>,

    /// Acceptor tasks sharing the listening socket
    #[arg(long, env = "MIMIC_MIN_THREADS")]
    min_threads: Option<usize>,

    /// Maximum concurrently executing requests
    #[arg(long, env = "MIMIC_MAX_THREADS")]
    max_threads: Option<usize>,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "MIMIC_TIMEOUT_MILLIS")]
    timeout_millis: Option<u64>,

    /// Answer CORS preflights and allow any origin
    #[arg(long, env = "MIMIC_ENABLE_CORS")]
    enable_cors: bool,

    /// Start the proxy subsystem with the mock server
    #[arg(long, env = "MIMIC_ENABLE_PROXY")]
    enable_proxy: bool,

    /// Admin API port
    #[arg(long, env = "MIMIC_ADMIN_PORT")]
    admin_port: Option<u16>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        let server = &mut config.server;
        if let Some(port) = self.port {
            server.port = port;
        }
        if let Some(min_threads) = self.min_threads {
            server.min_threads = min_threads;
        }
        if let Some(max_threads) = self.max_threads {
            server.max_threads = max_threads;
        }
        if let Some(timeout_millis) = self.timeout_millis {
            server.timeout_millis = timeout_millis;
        }
        if self.enable_cors {
            server
                .native_properties
                .insert(ENABLE_CORS_PARAM.to_string(), "true".to_string());
        }
        if self.enable_proxy {
            server
                .native_properties
                .insert(PROXY_SERVER_ENABLED_PARAM.to_string(), "true".to_string());
        }
        if let Some(admin_port) = self.admin_port {
            config.admin.port = admin_port;
        }
    }
}

fn load_config(args: &Args) -> Result<Config, anyhow::Error> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run(config: Config) -> Result<(), anyhow::Error> {
    let live_log = Arc::new(LiveLoggingHandler::new());
    let engine = Arc::new(
        MockServerEngine::builder()
            .mocks(config.mocks.clone())
            .traffic_sink(live_log.clone())
            .build(),
    );

    engine.start(&config.server).await?;

    let admin = if config.admin.enabled {
        let addr = SocketAddr::new(config.admin.host, config.admin.port);
        let state = Arc::new(AdminState {
            engine: Arc::clone(&engine),
            config: config.server.clone(),
            live_log,
        });
        let server = AdminApiServer::new(addr, state);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Admin API failed: {}", e);
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(admin) = admin {
        admin.abort();
    }
    engine.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Mimic v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = run(config).await {
        error!("Mimic failed: {:#}", e);
        std::process::exit(1);
    }
}
