//! Email send-queue processor.
//!
//! Drains due queue entries to the email provider, with two policy
//! checks the post processor does not have: unsubscribed recipients are
//! cancelled rather than sent, and prospect-sequence mail for recipients
//! who already converted to ambassador is cancelled with the enrollment
//! marked converted. Failed sends are retried a bounded number of times
//! before failing terminally, and a reconciliation pass completes any
//! enrollment with nothing left outstanding.

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

use crate::config::Config;
use crate::deliver::{EmailSender, OutboundEmail};
use crate::error::StoreError;
use crate::process::template::{append_footer, render};
use crate::store::{
    NewEmailLog, QueueEntry, SequenceType, Store, Subscription, SubscriptionStatus,
};

use super::EmailRunSummary;

/// What one queue entry resolved to.
enum RowOutcome {
    Sent,
    Skipped,
    ClaimLost,
}

/// Run one email-queue invocation.
///
/// Returns Err only when the due-set query fails; per-row failures are
/// recorded on the row and counted in the summary.
pub async fn process_email_queue(
    store: &dyn Store,
    sender: &dyn EmailSender,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<EmailRunSummary, StoreError> {
    info!(batch_size = config.email_batch_size, "email_processor_start");

    let due = store.due_queue_entries(now, config.email_batch_size).await?;
    let total = due.len();

    info!(due = total, "email_processor_due_set");

    let mut sent = 0;
    let mut skipped = 0;
    let mut failed = 0;

    for entry in due {
        let entry_id = entry.id;
        match send_entry(store, sender, config, &entry, now).await {
            Ok(RowOutcome::Sent) => {
                sent += 1;
                info!(entry_id = %entry_id, "email_sent");
            }
            Ok(RowOutcome::Skipped) => {
                skipped += 1;
                info!(entry_id = %entry_id, "email_skipped");
            }
            Ok(RowOutcome::ClaimLost) => {
                info!(entry_id = %entry_id, "email_claim_lost");
            }
            Err(e) => {
                error!(entry_id = %entry_id, error = %e, "email_send_failed");
                if let Err(store_err) = record_failure(store, config, &entry, now, &e).await {
                    error!(entry_id = %entry_id, error = %store_err, "email_failure_record_failed");
                }
                failed += 1;
            }
        }
    }

    reconcile_enrollments(store, now).await;

    let summary = EmailRunSummary {
        sent,
        skipped,
        failed,
        total,
    };

    info!(
        sent = summary.sent,
        skipped = summary.skipped,
        failed = summary.failed,
        total = summary.total,
        "email_processor_complete"
    );

    Ok(summary)
}

/// Policy-check, claim, render, and send one queue entry.
async fn send_entry(
    store: &dyn Store,
    sender: &dyn EmailSender,
    config: &Config,
    entry: &QueueEntry,
    now: DateTime<Utc>,
) -> anyhow::Result<RowOutcome> {
    // Unsubscribes that landed after enrollment cancel the send.
    let subscription = store.subscription(entry.subscription_id).await?;
    let subscription = match subscription {
        Some(sub) if sub.status == SubscriptionStatus::Active => sub,
        _ => {
            store.mark_queue_cancelled(entry.id).await?;
            info!(entry_id = %entry.id, "email_cancelled_inactive_subscription");
            return Ok(RowOutcome::Skipped);
        }
    };

    // Prospect nurture stops once the recipient converted elsewhere.
    if converted_prospect(store, entry, &subscription).await? {
        store.mark_queue_cancelled(entry.id).await?;
        store.mark_enrollment_converted(entry.enrollment_id, now).await?;
        info!(entry_id = %entry.id, "email_cancelled_recipient_converted");
        return Ok(RowOutcome::Skipped);
    }

    if !store.claim_queue_entry(entry.id).await? {
        return Ok(RowOutcome::ClaimLost);
    }

    let template = store
        .template(entry.template_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("template {} missing", entry.template_id))?;

    let first_name = subscription.first_name.as_deref().unwrap_or("Friend");
    let variables = [
        ("first_name", first_name),
        ("email", subscription.email.as_str()),
        ("site_url", config.site_url.as_str()),
    ];

    let subject = render(&template.subject, &variables);
    let html = append_footer(
        &render(&template.html_content, &variables),
        &config.site_url,
        &subscription.email,
        config.unsubscribe_signing_key.as_deref(),
    );

    let provider_id = sender
        .send(&OutboundEmail {
            from: config.from_email.clone(),
            to: vec![subscription.email.clone()],
            subject: subject.clone(),
            html,
        })
        .await?;

    store.mark_queue_sent(entry.id, now).await?;

    store
        .insert_email_log(NewEmailLog {
            subscription_id: entry.subscription_id,
            template_id: entry.template_id,
            email_to: subscription.email.clone(),
            subject,
            status: "sent".to_string(),
            provider_id: Some(provider_id),
        })
        .await?;

    store
        .set_enrollment_step(entry.enrollment_id, template.step_order + 1)
        .await?;

    Ok(RowOutcome::Sent)
}

/// True when this entry belongs to a prospect sequence and its recipient
/// has since acquired the ambassador role.
async fn converted_prospect(
    store: &dyn Store,
    entry: &QueueEntry,
    subscription: &Subscription,
) -> Result<bool, StoreError> {
    let enrollment = match store.enrollment(entry.enrollment_id).await? {
        Some(enrollment) => enrollment,
        None => return Ok(false),
    };
    let sequence = match store.sequence(enrollment.sequence_id).await? {
        Some(sequence) => sequence,
        None => return Ok(false),
    };
    if sequence.sequence_type != SequenceType::Prospect {
        return Ok(false);
    }

    let user_id = match store.user_id_by_email(&subscription.email).await? {
        Some(id) => id,
        None => return Ok(false),
    };
    store.user_has_role(user_id, "ambassador").await
}

/// Re-queue with a delay while under the attempt bound, fail terminally
/// at it. `entry.attempts` is the pre-claim count; the claim already
/// incremented the stored row.
async fn record_failure(
    store: &dyn Store,
    config: &Config,
    entry: &QueueEntry,
    now: DateTime<Utc>,
    error: &anyhow::Error,
) -> Result<(), StoreError> {
    let attempts_made = entry.attempts + 1;
    if attempts_made >= config.max_email_attempts {
        store.mark_queue_failed(entry.id, &error.to_string()).await
    } else {
        let next = now + Duration::minutes(config.retry_delay_minutes);
        store.requeue_entry(entry.id, next, &error.to_string()).await
    }
}

/// Mark active enrollments with nothing pending or processing left as
/// completed. Batch reconciliation, not event-driven completion.
async fn reconcile_enrollments(store: &dyn Store, now: DateTime<Utc>) {
    let enrollments = match store.active_enrollments().await {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "enrollment_reconcile_query_failed");
            return;
        }
    };

    for enrollment in enrollments {
        match store.outstanding_entries(enrollment.id).await {
            Ok(0) => {
                if let Err(e) = store.mark_enrollment_completed(enrollment.id, now).await {
                    error!(enrollment_id = %enrollment.id, error = %e, "enrollment_complete_failed");
                } else {
                    info!(enrollment_id = %enrollment.id, "enrollment_completed");
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(enrollment_id = %enrollment.id, error = %e, "enrollment_reconcile_failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::error::DeliveryError;
    use crate::store::types::{
        EmailTemplate, Enrollment, EnrollmentStatus, Profile, QueueStatus, Sequence,
    };
    use crate::store::MemoryStore;

    fn test_config() -> Config {
        Config {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: String::new(),
            resend_api_key: String::new(),
            from_email: "Wanderlink <hello@wanderlink.example>".to_string(),
            admin_email: "leads@wanderlink.example".to_string(),
            site_url: "https://wanderlink.example".to_string(),
            post_batch_size: 100,
            email_batch_size: 50,
            max_email_attempts: 3,
            retry_delay_minutes: 60,
            request_timeout_ms: 15_000,
            poll_interval_secs: 300,
            port: 8080,
            unsubscribe_signing_key: None,
        }
    }

    struct RecordingSender {
        calls: Mutex<Vec<OutboundEmail>>,
        fail: bool,
    }

    impl RecordingSender {
        fn ok() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn calls(&self) -> Vec<OutboundEmail> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, message: &OutboundEmail) -> Result<String, DeliveryError> {
            self.calls.lock().unwrap().push(message.clone());
            if self.fail {
                Err(DeliveryError::Rejected {
                    endpoint: "resend",
                    status: 500,
                    body: "simulated provider outage".to_string(),
                })
            } else {
                Ok("re_test123".to_string())
            }
        }
    }

    /// A subscription, prospect sequence, one-step template, enrollment,
    /// and a due queue entry, all wired together.
    struct Fixture {
        store: MemoryStore,
        subscription: Subscription,
        enrollment: Enrollment,
        entry: QueueEntry,
    }

    async fn fixture(now: DateTime<Utc>) -> Fixture {
        let store = MemoryStore::new();

        let subscription = Subscription {
            id: Uuid::new_v4(),
            email: "pat@example.com".to_string(),
            first_name: Some("Pat".to_string()),
            status: SubscriptionStatus::Active,
            unsubscribed_at: None,
        };
        let sequence = Sequence {
            id: Uuid::new_v4(),
            name: "Prospect nurture".to_string(),
            sequence_type: SequenceType::Prospect,
        };
        let template = EmailTemplate {
            id: Uuid::new_v4(),
            sequence_id: sequence.id,
            step_order: 0,
            subject: "Hi {{first_name}}".to_string(),
            html_content: "<html><body>Visit {{site_url}}</body></html>".to_string(),
        };
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            sequence_id: sequence.id,
            current_step: 0,
            status: EnrollmentStatus::Active,
            completed_at: None,
            converted_at: None,
        };
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            template_id: template.id,
            enrollment_id: enrollment.id,
            scheduled_for: now - Duration::minutes(5),
            attempts: 0,
            status: QueueStatus::Pending,
            sent_at: None,
            last_error: None,
        };

        store.seed_subscription(subscription.clone()).await;
        store.seed_sequence(sequence).await;
        store.seed_template(template).await;
        store.seed_enrollment(enrollment.clone()).await;
        store.seed_queue_entry(entry.clone()).await;

        Fixture {
            store,
            subscription,
            enrollment,
            entry,
        }
    }

    #[tokio::test]
    async fn test_due_entry_sent_and_logged() {
        let now = Utc::now();
        let f = fixture(now).await;
        let sender = RecordingSender::ok();
        let config = test_config();

        let summary = process_email_queue(&f.store, &sender, &config, now)
            .await
            .unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 0);

        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].subject, "Hi Pat");
        assert!(calls[0].html.contains("https://wanderlink.example"));
        assert!(calls[0].html.contains("/unsubscribe?token="));

        let entry = f.store.queue_entry(f.entry.id).await.unwrap();
        assert_eq!(entry.status, QueueStatus::Sent);
        assert!(entry.sent_at.is_some());

        let logs = f.store.email_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].provider_id.as_deref(), Some("re_test123"));

        // step_order 0 sent, so the enrollment sits at step 1 and the
        // reconciliation pass completes it in the same invocation.
        let enrollment = f.store.enrollment_row(f.enrollment.id).await.unwrap();
        assert_eq!(enrollment.current_step, 1);
        assert_eq!(enrollment.status, EnrollmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_unsubscribed_recipient_cancelled_without_send() {
        // Scenario C: subscription unsubscribed after enrollment.
        let now = Utc::now();
        let f = fixture(now).await;
        let sender = RecordingSender::ok();
        let config = test_config();

        f.store
            .mark_subscription_unsubscribed(&f.subscription.email, now)
            .await
            .unwrap();

        let summary = process_email_queue(&f.store, &sender, &config, now)
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.sent, 0);
        assert!(sender.calls().is_empty());
        assert_eq!(
            f.store.queue_entry(f.entry.id).await.unwrap().status,
            QueueStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_converted_prospect_cancelled_and_enrollment_converted() {
        let now = Utc::now();
        let f = fixture(now).await;
        let sender = RecordingSender::ok();
        let config = test_config();

        let user_id = Uuid::new_v4();
        f.store
            .seed_profile(Profile {
                id: user_id,
                full_name: Some("Pat Doe".to_string()),
                email: Some(f.subscription.email.clone()),
            })
            .await;
        f.store.seed_role(user_id, "ambassador").await;

        let summary = process_email_queue(&f.store, &sender, &config, now)
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(sender.calls().is_empty());
        assert_eq!(
            f.store.queue_entry(f.entry.id).await.unwrap().status,
            QueueStatus::Cancelled
        );
        let enrollment = f.store.enrollment_row(f.enrollment.id).await.unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Converted);
        assert!(enrollment.converted_at.is_some());
    }

    #[tokio::test]
    async fn test_retry_bound_reached_fails_terminally() {
        // First two failures re-queue with a pushed-out due time; the
        // third marks the row failed and it leaves all future batches.
        let now = Utc::now();
        let f = fixture(now).await;
        let sender = RecordingSender::failing();
        let config = test_config();

        let first = process_email_queue(&f.store, &sender, &config, now)
            .await
            .unwrap();
        assert_eq!(first.failed, 1);
        let entry = f.store.queue_entry(f.entry.id).await.unwrap();
        assert_eq!(entry.status, QueueStatus::Pending);
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.scheduled_for, now + Duration::minutes(60));
        assert!(entry.last_error.is_some());

        let later = now + Duration::minutes(61);
        process_email_queue(&f.store, &sender, &config, later)
            .await
            .unwrap();
        assert_eq!(
            f.store.queue_entry(f.entry.id).await.unwrap().status,
            QueueStatus::Pending
        );

        let even_later = later + Duration::minutes(61);
        process_email_queue(&f.store, &sender, &config, even_later)
            .await
            .unwrap();
        let entry = f.store.queue_entry(f.entry.id).await.unwrap();
        assert_eq!(entry.status, QueueStatus::Failed);
        assert_eq!(entry.attempts, 3);

        let after = process_email_queue(&f.store, &sender, &config, even_later)
            .await
            .unwrap();
        assert_eq!(after.total, 0);
        assert_eq!(sender.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_reconciliation_leaves_outstanding_enrollments_active() {
        let now = Utc::now();
        let f = fixture(now).await;
        let sender = RecordingSender::ok();
        let config = test_config();

        // A second entry for the same enrollment, due in the future.
        f.store
            .seed_queue_entry(QueueEntry {
                id: Uuid::new_v4(),
                subscription_id: f.subscription.id,
                template_id: f.entry.template_id,
                enrollment_id: f.enrollment.id,
                scheduled_for: now + Duration::days(3),
                attempts: 0,
                status: QueueStatus::Pending,
                sent_at: None,
                last_error: None,
            })
            .await;

        process_email_queue(&f.store, &sender, &config, now)
            .await
            .unwrap();

        let enrollment = f.store.enrollment_row(f.enrollment.id).await.unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Active);
    }

    #[tokio::test]
    async fn test_missing_first_name_falls_back_to_friend() {
        let now = Utc::now();
        let f = fixture(now).await;
        let sender = RecordingSender::ok();
        let config = test_config();

        let mut sub = f.subscription.clone();
        sub.first_name = None;
        f.store.seed_subscription(sub).await;

        process_email_queue(&f.store, &sender, &config, now)
            .await
            .unwrap();
        assert_eq!(sender.calls()[0].subject, "Hi Friend");
    }
}
