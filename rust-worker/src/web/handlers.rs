//! HTTP endpoint handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::deliver::{EmailSender, SocialWebhook};
use crate::leads::{self, LeadError, LeadSubmission};
use crate::process::{process_email_queue, process_scheduled_posts};
use crate::store::Store;
use crate::token::decode_token;
use crate::chat as chat_rules;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub webhook: Arc<dyn SocialWebhook>,
    pub email: Arc<dyn EmailSender>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        webhook: Arc<dyn SocialWebhook>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            webhook,
            email,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Lead capture
// =============================================================================

#[derive(Serialize)]
pub struct LeadResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn submit_lead(
    State(state): State<AppState>,
    Json(submission): Json<LeadSubmission>,
) -> impl IntoResponse {
    info!(
        source = %submission.source,
        has_funnel_slug = submission.funnel_slug.is_some(),
        "lead_submission_received"
    );

    match leads::submit_lead(
        state.store.as_ref(),
        state.email.as_ref(),
        &state.config,
        submission,
    )
    .await
    {
        Ok(lead) => (
            StatusCode::OK,
            Json(LeadResponse {
                status: "ok",
                lead_id: Some(lead.id),
                error: None,
            }),
        ),
        Err(LeadError::Invalid(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(LeadResponse {
                status: "invalid",
                lead_id: None,
                error: Some(reason.to_string()),
            }),
        ),
        Err(LeadError::Store(e)) => {
            error!(error = %e, "lead_insert_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LeadResponse {
                    status: "error",
                    lead_id: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

// =============================================================================
// Processor triggers
// =============================================================================

#[derive(Serialize)]
pub struct ProcessorError {
    pub error: String,
}

/// Drain the scheduled-post queue once.
pub async fn run_post_processor(State(state): State<AppState>) -> impl IntoResponse {
    match process_scheduled_posts(
        state.store.as_ref(),
        state.webhook.as_ref(),
        &state.config,
        Utc::now(),
    )
    .await
    {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            error!(error = %e, "post_processor_fatal");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ProcessorError {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Drain the email send queue once.
pub async fn run_email_processor(State(state): State<AppState>) -> impl IntoResponse {
    match process_email_queue(
        state.store.as_ref(),
        state.email.as_ref(),
        &state.config,
        Utc::now(),
    )
    .await
    {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            error!(error = %e, "email_processor_fatal");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ProcessorError {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Unsubscribe
// =============================================================================

#[derive(Deserialize)]
pub struct UnsubscribeQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// One-click unsubscribe from email footers. Idempotent: repeating the
/// same token succeeds again.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Query(query): Query<UnsubscribeQuery>,
) -> impl IntoResponse {
    let email = query
        .token
        .as_deref()
        .and_then(|t| decode_token(t, state.config.unsubscribe_signing_key.as_deref()));

    let email = match email {
        Some(email) => email,
        None => {
            warn!("unsubscribe_invalid_token");
            return (
                StatusCode::BAD_REQUEST,
                Html(error_page("That unsubscribe link is not valid.")),
            );
        }
    };

    info!(email = %email, "unsubscribe_requested");

    let now = Utc::now();
    if let Err(e) = state.store.mark_subscription_unsubscribed(&email, now).await {
        error!(error = %e, "unsubscribe_update_failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(error_page("Something went wrong. Please try again later.")),
        );
    }

    // Halt anything in flight for this subscription.
    match state.store.subscription_by_email(&email).await {
        Ok(Some(subscription)) => {
            if let Err(e) = state
                .store
                .unsubscribe_active_enrollments(subscription.id)
                .await
            {
                error!(error = %e, "unsubscribe_enrollments_failed");
            }
            if let Err(e) = state.store.cancel_pending_queue(subscription.id).await {
                error!(error = %e, "unsubscribe_queue_cancel_failed");
            }
        }
        Ok(None) => {}
        Err(e) => error!(error = %e, "unsubscribe_lookup_failed"),
    }

    info!(email = %email, "unsubscribe_complete");

    (StatusCode::OK, Html(confirmation_page(&email)))
}

fn confirmation_page(email: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Unsubscribed</title><meta name="viewport" content="width=device-width, initial-scale=1"></head>
<body style="font-family: sans-serif; text-align: center; padding: 60px 20px;">
  <h1>You're unsubscribed</h1>
  <p>We've removed <strong>{email}</strong> from our email list.</p>
  <p>If you change your mind, you're always welcome back.</p>
</body>
</html>"#
    )
}

fn error_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Error</title><meta name="viewport" content="width=device-width, initial-scale=1"></head>
<body style="font-family: sans-serif; text-align: center; padding: 60px 20px;">
  <h1>Something went wrong</h1>
  <p>{message}</p>
</body>
</html>"#
    )
}

// =============================================================================
// Click tracking
// =============================================================================

#[derive(Deserialize)]
pub struct TrackClickQuery {
    #[serde(default)]
    pub post_id: Option<Uuid>,
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Serialize)]
pub struct TrackClickResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// Count a click on a delivered post's tracking link. Lookup failures
/// are logged, never surfaced to the visitor.
pub async fn track_click(
    State(state): State<AppState>,
    Query(query): Query<TrackClickQuery>,
) -> impl IntoResponse {
    let (post_id, platform) = match (query.post_id, query.platform) {
        (Some(post_id), Some(platform)) if !platform.is_empty() => (post_id, platform),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(TrackClickResponse {
                    success: false,
                    post_id: None,
                    platform: None,
                    error: Some("post_id and platform are required"),
                }),
            );
        }
    };

    info!(post_id = %post_id, platform = %platform, "click_tracked");

    match state.store.analytics_for(post_id, &platform).await {
        Ok(Some(row)) => {
            if let Err(e) = state.store.increment_analytics_clicks(row.id).await {
                error!(post_id = %post_id, error = %e, "click_increment_failed");
            }
        }
        Ok(None) => {
            warn!(post_id = %post_id, platform = %platform, "click_analytics_missing");
        }
        Err(e) => {
            error!(post_id = %post_id, error = %e, "click_lookup_failed");
        }
    }

    (
        StatusCode::OK,
        Json(TrackClickResponse {
            success: true,
            post_id: Some(post_id),
            platform: Some(platform),
            error: None,
        }),
    )
}

// =============================================================================
// Chat
// =============================================================================

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: &'static str,
}

pub async fn chat(Json(request): Json<ChatRequest>) -> Json<ChatResponse> {
    Json(ChatResponse {
        response: chat_rules::respond(&request.message),
    })
}
