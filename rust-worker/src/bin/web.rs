//! Wanderlink Web Server - public HTTP surface.
//!
//! This binary serves:
//! - Lead capture from the funnel pages
//! - One-click email unsubscribe
//! - Social click tracking
//! - Chat widget replies
//! - HTTP triggers for the two queue processors (cron-style pings)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wanderlink::{web, Config, HttpWebhook, PostgrestStore, ResendClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        site_url = %config.site_url,
        unsubscribe_signing_configured = config.unsubscribe_signing_key.is_some(),
        "config_loaded"
    );

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let store = Arc::new(PostgrestStore::new(
        client.clone(),
        &config.supabase_url,
        &config.supabase_service_key,
    ));
    let webhook = Arc::new(HttpWebhook::new(client.clone(), config.request_timeout()));
    let email = Arc::new(ResendClient::new(
        client,
        &config.resend_api_key,
        config.request_timeout(),
    ));

    let port = config.port;

    // Build the router
    let app = web::router(config, store, webhook, email).layer(TraceLayer::new_for_http());

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");
    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
