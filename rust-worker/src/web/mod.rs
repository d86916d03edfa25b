//! Web server module for the public endpoints and processor triggers.
//!
//! The processors are also runnable from here so a cron-style HTTP ping
//! can drive them; a completed invocation answers 200 with its summary
//! even when individual rows failed, and 5xx only when the due-set
//! query failed before any row was touched.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::config::Config;
use crate::deliver::{EmailSender, SocialWebhook};
use crate::store::Store;

pub use handlers::AppState;

/// Build the application router.
pub fn router(
    config: Config,
    store: Arc<dyn Store>,
    webhook: Arc<dyn SocialWebhook>,
    email: Arc<dyn EmailSender>,
) -> Router {
    let state = AppState::new(config, store, webhook, email);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/leads", post(handlers::submit_lead))
        .route("/process/posts", post(handlers::run_post_processor))
        .route("/process/email-queue", post(handlers::run_email_processor))
        .route("/unsubscribe", get(handlers::unsubscribe))
        .route("/track/click", get(handlers::track_click))
        .route("/chat", post(handlers::chat))
        .with_state(state)
}
