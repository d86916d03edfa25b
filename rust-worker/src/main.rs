//! Wanderlink Worker - interval poller for the two queue processors.
//!
//! Each tick runs the scheduled-post processor and then the email-queue
//! processor against the production store. A tick that cannot reach the
//! store logs the failure and waits for the next tick; rows are never
//! lost, only delayed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::{signal, time};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wanderlink::{
    process_email_queue, process_scheduled_posts, Config, HttpWebhook, PostgrestStore,
    ResendClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("worker_starting");

    let config = Config::from_env();
    info!(
        poll_interval_secs = config.poll_interval_secs,
        post_batch_size = config.post_batch_size,
        email_batch_size = config.email_batch_size,
        "config_loaded"
    );

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let store = Arc::new(PostgrestStore::new(
        client.clone(),
        &config.supabase_url,
        &config.supabase_service_key,
    ));
    let webhook = HttpWebhook::new(client.clone(), config.request_timeout());
    let email = ResendClient::new(client, &config.resend_api_key, config.request_timeout());

    let mut ticker = time::interval(Duration::from_secs(config.poll_interval_secs));
    // The first tick fires immediately, which is what we want on deploy.

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("worker_ready");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("worker_stopping");
                break;
            }
            _ = ticker.tick() => {
                let now = Utc::now();

                match process_scheduled_posts(store.as_ref(), &webhook, &config, now).await {
                    Ok(summary) => info!(
                        processed = summary.processed,
                        failed = summary.failed,
                        total = summary.total,
                        "post_tick_complete"
                    ),
                    Err(e) => error!(error = %e, "post_tick_failed"),
                }

                match process_email_queue(store.as_ref(), &email, &config, now).await {
                    Ok(summary) => info!(
                        sent = summary.sent,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        total = summary.total,
                        "email_tick_complete"
                    ),
                    Err(e) => error!(error = %e, "email_tick_failed"),
                }
            }
        }
    }

    info!("worker_shutdown_complete");
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
