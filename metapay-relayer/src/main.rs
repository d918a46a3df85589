//! Relay HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p metapay-relayer --release
//!
//! # Run with custom config path
//! metapay-relayer --config /path/to/config.toml
//!
//! # Configure logging level
//! RUST_LOG=metapay_relayer=debug metapay-relayer
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` - Override bind address (default: `0.0.0.0`)
//! - `PORT` - Override port (default: `3001`)
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! A `.env` file in the working directory is loaded first.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use clap::Parser;
use metapay::RelayAuth;
use metapay_evm::{Eip155Forwarder, ForwarderProviderConfig};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use metapay_relayer::config::RelayerConfig;
use metapay_relayer::handlers::{RelayerState, cors_layer, relayer_router};
use metapay_relayer::pipeline::AdmissionPipeline;
use metapay_relayer::rate_limit::{ClientRateLimiter, limit_by_client};
use metapay_relayer::util::SigDown;

/// How often idle rate-limit buckets are dropped.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("Relayer failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = RelayerConfig::load_from(&cli.config)?;
    config.validate()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        chain_id = config.chain_id,
        forwarder = %config.forwarder,
        recipient = %config.recipient,
        cors_origins = ?config.cors_origins,
        "Loaded configuration"
    );

    let chain = Eip155Forwarder::new(
        config.rpc_url()?,
        config.relayer_signer()?,
        config.forwarder,
        ForwarderProviderConfig {
            receipt_timeout_secs: config.receipt_timeout_secs,
            confirmations: config.confirmations,
        },
    );
    tracing::info!(relayer = %chain.relayer(), "Relaying from");

    let pipeline = AdmissionPipeline::new(
        RelayAuth::new(&config.hmac_secret)?,
        config.domain(),
        Arc::new(chain),
    )
    .with_execution_timeout(config.execution_timeout())
    .with_signature_check(config.signature_verification);
    let pipeline = Arc::new(pipeline);
    let state = RelayerState::new(Arc::clone(&pipeline), config.recipient);
    let limiter = Arc::new(ClientRateLimiter::new(config.rate_limit)?);

    let sig_down = SigDown::try_new()?;
    let token = sig_down.cancellation_token();

    let pruner = {
        let limiter = Arc::clone(&limiter);
        let token = token.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => limiter.prune(),
                }
            }
        })
    };

    let app = relayer_router(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&limiter),
            limit_by_client,
        ))
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Relayer listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { token.cancelled().await })
    .await?;

    sig_down.recv().await;
    pruner.await?;
    tracing::info!("Waiting for in-flight executions");
    pipeline.drain().await;
    tracing::info!("Relayer shut down gracefully");
    Ok(())
}
