//! Bakong Checkout Server
//!
//! A headless payment-reconciliation service for accepting Bakong KHQR
//! payments against shop orders.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use bakong_core::provider::{BakongClient, BakongClientConfig, RetryPolicy};
use bakong_core::recon::{EngineConfig, ReconEngine};
use bakong_core::store::PgReconStore;
use clap::Parser;
use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Bakong Checkout - KHQR payment reconciliation server
#[derive(Parser, Debug)]
#[command(name = "bakong-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./bakong-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting bakong-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // Wire the provider client and the reconciliation engine
    let client = BakongClient::new(
        BakongClientConfig {
            base_url: config.bakong.base_url.clone(),
            api_key: config.bakong.api_key.clone(),
            merchant_id: config.bakong.merchant_id.clone(),
            verify_tls: config.bakong.verify_tls,
        },
        RetryPolicy::default(),
    )
    .map_err(|e| {
        tracing::error!("Failed to build Bakong client: {}", e);
        e
    })?;
    if !config.bakong.verify_tls {
        tracing::warn!("TLS verification disabled for the Bakong API (sandbox profile)");
    }

    let engine = ReconEngine::new(
        PgReconStore::new(db_pool.clone()),
        client,
        EngineConfig {
            currency: config.bakong.default_currency,
            callback_url: config.bakong.callback_url.clone(),
        },
    );

    // Create application state
    let state = AppState::new(engine);

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
