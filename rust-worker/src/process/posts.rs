//! Scheduled-post queue processor.
//!
//! Finds every pending post whose scheduled time has passed, delivers it
//! to the webhook URL frozen on the row at scheduling time, and records
//! the outcome. Delivery failures are terminal for the row; an operator
//! resets the status to pending to retry.

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::deliver::{PostPayload, SocialWebhook};
use crate::error::StoreError;
use crate::store::{ScheduledPost, Store};

use super::PostRunSummary;

/// Tracking link back to the ambassador's funnel, tagged with the post
/// id for click attribution.
pub fn tracking_link(site_url: &str, funnel_slug: &str, post_id: Uuid) -> String {
    format!(
        "{}/f/{}?ref=social&post_id={}",
        site_url.trim_end_matches('/'),
        funnel_slug,
        post_id
    )
}

/// Compose the outbound caption.
///
/// The custom caption is used verbatim when present. The tracking link
/// is appended exactly once, unless the caption already carries a link
/// of its own (any "http" substring counts).
pub fn compose_caption(custom_caption: Option<&str>, funnel_link: &str) -> String {
    let mut caption = custom_caption.unwrap_or("").to_string();
    if !caption.contains("http") {
        caption.push_str(&format!("\n\n🌍 Plan your next escape: {funnel_link}"));
    }
    caption
}

/// Run one scheduled-post invocation.
///
/// Returns Err only when the due-set query itself fails; every per-row
/// failure is recorded on the row and counted in the summary.
pub async fn process_scheduled_posts(
    store: &dyn Store,
    webhook: &dyn SocialWebhook,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<PostRunSummary, StoreError> {
    info!(batch_size = config.post_batch_size, "post_processor_start");

    let due = store
        .due_scheduled_posts(now, config.post_batch_size)
        .await?;
    let total = due.len();

    info!(due = total, "post_processor_due_set");

    let mut processed = 0;
    let mut failed = 0;

    for post in due {
        let post_id = post.id;
        match deliver_post(store, webhook, config, &post, now).await {
            Ok(true) => {
                processed += 1;
                info!(post_id = %post_id, "post_delivered");
            }
            Ok(false) => {
                // Lost the claim to a concurrent invocation.
                info!(post_id = %post_id, "post_claim_lost");
            }
            Err(e) => {
                error!(post_id = %post_id, error = %e, "post_delivery_failed");
                if let Err(store_err) = store.mark_post_failed(post_id, &e.to_string()).await {
                    error!(post_id = %post_id, error = %store_err, "post_failure_record_failed");
                }
                failed += 1;
            }
        }
    }

    let summary = PostRunSummary {
        processed,
        failed,
        total,
    };

    info!(
        processed = summary.processed,
        failed = summary.failed,
        total = summary.total,
        "post_processor_complete"
    );

    Ok(summary)
}

/// Claim, compose, and deliver one post. Ok(false) means another
/// invocation claimed the row first.
async fn deliver_post(
    store: &dyn Store,
    webhook: &dyn SocialWebhook,
    config: &Config,
    post: &ScheduledPost,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    if !store.claim_scheduled_post(post.id).await? {
        return Ok(false);
    }

    // Display data is resolved at send time; only the webhook URL is
    // honored as scheduled.
    let ambassador_name = store
        .profile_name(post.ambassador_id)
        .await?
        .unwrap_or_else(|| "Ambassador".to_string());
    let funnel_slug = store
        .funnel_slug_for_user(post.ambassador_id)
        .await?
        .unwrap_or_else(|| "default".to_string());

    let funnel_link = tracking_link(&config.site_url, &funnel_slug, post.id);
    let caption = compose_caption(post.custom_caption.as_deref(), &funnel_link);
    let image_url = post
        .content_file_url
        .clone()
        .or_else(|| post.content_thumbnail_url.clone())
        .unwrap_or_default();

    let payload = PostPayload {
        caption,
        image_url,
        platforms: post.platforms.clone(),
        ambassador_name,
        post_id: post.id,
        funnel_link,
    };

    webhook.deliver(&post.webhook_url, &payload).await?;

    store.mark_post_posted(post.id, now).await?;

    for platform in &post.platforms {
        store
            .insert_post_analytics(post.id, post.ambassador_id, platform)
            .await?;
    }

    Ok(true)
}
