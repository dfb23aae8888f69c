//! TLS REST server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──TLS──▶ net (listener, session, tls)
//!                        │
//!            ┌───────────┴────────────┐
//!            ▼                        ▼
//!     http (managed mode)       SessionHandler (raw mode)
//!     dispatcher → routing
//!            │
//!            ▼
//!     handler (action | stream) → codec
//!
//!     Cross-cutting: config, observability, lifecycle
//! ```
//!
//! Managed mode serves a welcome page on `/` and an OK envelope on
//! `/health`. Raw mode echoes every session's bytes back.

use std::io;
use std::path::PathBuf;

use axum::http::Method;
use clap::Parser;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, info};

use tls_rest::config::{load_config, ServiceConfig, TransportMode};
use tls_rest::lifecycle::shutdown_signal;
use tls_rest::observability::{logging, metrics};
use tls_rest::{ActionCall, ActionError, Handler, MediaType, RawSession, RestServer, SessionHandler};

const WELCOME: &str = "Welcome to the rest server\n";

#[derive(Parser)]
#[command(name = "tls-rest")]
#[command(about = "TLS REST server", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

struct Echo;

impl SessionHandler for Echo {
    fn handle<'a>(&'a self, session: &'a mut RawSession) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let mut buf = [0u8; 4096];
            loop {
                let n = session.stream.read(&mut buf).await?;
                if n == 0 {
                    return Ok(());
                }
                session.stream.write_all(&buf[..n]).await?;
            }
        })
    }
}

fn managed_server(config: &ServiceConfig) -> RestServer {
    let server = RestServer::from_config(config);
    server.add_root_path(
        [Method::GET],
        MediaType::PlainText,
        MediaType::PlainText,
        Handler::action(
            |call: ActionCall| async move {
                call.sink.success(WELCOME);
                Ok::<(), ActionError>(())
            },
            true,
        ),
    );
    server.add_action(
        "/health",
        [Method::GET, Method::HEAD],
        MediaType::Json,
        MediaType::Json,
        |_call: ActionCall| async { Ok::<(), ActionError>(()) },
        false,
    );
    server
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    info!(version = env!("CARGO_PKG_VERSION"), "tls-rest starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = match config.listener.mode {
        TransportMode::Managed => managed_server(&config),
        TransportMode::Raw => RestServer::from_config(&config).with_session_handler(Echo),
    };

    let address = match &config.tls {
        Some(material) => server.start_tls(&config.listener.bind_address, material)?,
        None => server.start(&config.listener.bind_address)?,
    };
    info!(address = %address, mode = ?server.mode(), "Listening for connections");

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = server.wait_for() => {}
    }

    server.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}
