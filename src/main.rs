// src/main.rs
// askdb service binary

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use askdb::config::Config;
use askdb::scheduler::Scheduler;
use askdb::state::AppState;
use askdb::{http, metrics};

#[derive(Parser)]
#[command(name = "askdb", about = "Conversational natural-language-to-SQL query service")]
struct Args {
    /// Bind host (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    config.validate()?;
    metrics::init_metrics();

    let state = AppState::initialize(config).await?;

    // Warm the catalog so the first question doesn't pay for introspection
    if let Err(e) = state.catalog.refresh().await {
        tracing::warn!("Initial schema refresh failed, continuing lazily: {}", e);
    }

    let mut scheduler = Scheduler::new(
        state.cache.clone(),
        state.catalog.clone(),
        state.config.cache.schema_cache_ttl_secs,
    );
    scheduler.start();

    let app = http::router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let bind_address = state.config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("askdb listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    scheduler.shutdown();
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
    state.dispatcher.shutdown();
}
