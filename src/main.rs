//! LED Areas HTTP API Server
//!
//! Loads the strip/area layout from a JSON config and serves an API that
//! switches each area between animation modes.
//!
//! ## Architecture
//! - **Controller**: owns every area; built once at startup
//! - **Areas**: each runs its calculator and render loop as tokio tasks
//! - **HTTP server** (tokio/axum): accepts API requests, awaits mode changes
//!
//! ## Usage
//! ```sh
//! ./target/release/led-areas-rs --config config/default.json --port 8080
//! ```

use clap::Parser;
use led_areas_rs::config::Config;
use led_areas_rs::controller::Controller;
use led_areas_rs::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// LED Areas HTTP API Server
#[derive(Parser)]
#[command(name = "led-areas-rs")]
#[command(about = "HTTP API server for animating LED strip areas")]
#[command(version)]
struct Args {
    /// JSON file describing strips and areas
    #[arg(long, default_value = "config/default.json")]
    config: PathBuf,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let args = Args::parse();

    tracing::info!("LED Areas HTTP Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Config: {}", args.config.display());

    let config = Config::load(&args.config)?;
    let controller = Arc::new(Controller::from_config(&config)?);

    let app = server::create_router(AppState {
        controller: controller.clone(),
    });

    let addr = format!("{}:{}", args.bind, args.port);
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);
    tracing::info!("Try: curl http://localhost:{}/api/v1/areas", args.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    match Arc::try_unwrap(controller) {
        Ok(controller) => controller.shutdown().await,
        // A request still holds a handle; stop the areas anyway
        Err(shared) => shared.stop_all().await,
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
