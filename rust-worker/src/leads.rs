//! Lead capture and best-effort notifications.
//!
//! A form submit validates, resolves the owning ambassador from the
//! referring funnel slug, and inserts the lead. The two follow-up emails
//! (admin alert, recipient welcome) are fire-and-forget: a provider
//! failure is logged and never fails the submit.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::deliver::{EmailSender, OutboundEmail};
use crate::error::StoreError;
use crate::store::{Lead, LeadStatus, NewLead, Store};

/// Payload from the public lead forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSubmission {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub source: String,
    #[serde(default)]
    pub funnel_slug: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub preferred_contact_time: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
}

#[derive(Debug, Error)]
pub enum LeadError {
    #[error("{0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validate the submission's required fields.
pub fn validate(submission: &LeadSubmission) -> Result<(), LeadError> {
    if submission.full_name.trim().is_empty() {
        return Err(LeadError::Invalid("full_name is required"));
    }
    if !is_valid_email(&submission.email) {
        return Err(LeadError::Invalid("email is not valid"));
    }
    if submission.source.trim().is_empty() {
        return Err(LeadError::Invalid("source is required"));
    }
    Ok(())
}

/// Minimal shape check: one `@` with a dotted domain after it.
fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Insert a lead and fire the notification emails.
pub async fn submit_lead(
    store: &dyn Store,
    sender: &dyn EmailSender,
    config: &Config,
    submission: LeadSubmission,
) -> Result<Lead, LeadError> {
    validate(&submission)?;

    // Attribute the lead to the ambassador owning the referring funnel.
    let ambassador_id = match submission.funnel_slug.as_deref() {
        Some(slug) => store.funnel_by_slug(slug).await?.map(|f| f.user_id),
        None => None,
    };

    let lead = store
        .insert_lead(NewLead {
            full_name: submission.full_name.trim().to_string(),
            email: submission.email.trim().to_string(),
            phone: submission.phone.clone(),
            source: submission.source.clone(),
            funnel_slug: submission.funnel_slug.clone(),
            ambassador_id,
            utm_source: submission.utm_source.clone(),
            utm_medium: submission.utm_medium.clone(),
            utm_campaign: submission.utm_campaign.clone(),
            preferred_contact_time: submission.preferred_contact_time.clone(),
            intent: submission.intent.clone(),
            status: LeadStatus::Prospect,
        })
        .await?;

    info!(
        lead_id = %lead.id,
        source = %lead.source,
        has_ambassador = lead.ambassador_id.is_some(),
        "lead_captured"
    );

    // Both notifications are best-effort.
    if let Err(e) = sender.send(&admin_alert(config, &lead)).await {
        warn!(lead_id = %lead.id, error = %e, "admin_alert_failed");
    }
    if let Err(e) = sender.send(&welcome_email(config, &lead)).await {
        warn!(lead_id = %lead.id, error = %e, "welcome_email_failed");
    }

    Ok(lead)
}

/// Alert email to the operator. Subject leads with the intent so hot
/// leads stand out in the inbox.
fn admin_alert(config: &Config, lead: &Lead) -> OutboundEmail {
    let subject = match lead.intent.as_deref() {
        Some("join_now") => format!("New lead - ready to join: {}", lead.full_name),
        Some("need_info") => format!("New lead - needs follow-up: {}", lead.full_name),
        _ => format!("New lead from {}: {}", lead.source, lead.full_name),
    };

    let mut rows = vec![
        format!("<p><strong>Name:</strong> {}</p>", lead.full_name),
        format!(
            "<p><strong>Email:</strong> <a href=\"mailto:{0}\">{0}</a></p>",
            lead.email
        ),
        format!("<p><strong>Source:</strong> {}</p>", lead.source),
    ];
    if let Some(phone) = &lead.phone {
        rows.push(format!("<p><strong>Phone:</strong> {phone}</p>"));
    }
    if let Some(time) = &lead.preferred_contact_time {
        rows.push(format!("<p><strong>Best time to call:</strong> {time}</p>"));
    }
    if let Some(slug) = &lead.funnel_slug {
        rows.push(format!("<p><strong>Funnel:</strong> {slug}</p>"));
    }
    for (label, value) in [
        ("UTM source", &lead.utm_source),
        ("UTM medium", &lead.utm_medium),
        ("UTM campaign", &lead.utm_campaign),
    ] {
        if let Some(value) = value {
            rows.push(format!("<p><strong>{label}:</strong> {value}</p>"));
        }
    }

    OutboundEmail {
        from: config.from_email.clone(),
        to: vec![config.admin_email.clone()],
        subject,
        html: format!(
            "<div style=\"font-family: sans-serif; max-width: 600px;\"><h2>New lead</h2>{}</div>",
            rows.join("\n")
        ),
    }
}

/// Welcome email to the new lead.
fn welcome_email(config: &Config, lead: &Lead) -> OutboundEmail {
    let first_name = lead
        .full_name
        .split_whitespace()
        .next()
        .unwrap_or("there");

    OutboundEmail {
        from: config.from_email.clone(),
        to: vec![lead.email.clone()],
        subject: format!("Welcome, {first_name}! Here's what happens next"),
        html: format!(
            "<html><body style=\"font-family: sans-serif; max-width: 600px; margin: 0 auto;\">\
             <h1>Welcome, {first_name}!</h1>\
             <p>Thanks for your interest - you've taken the first step toward traveling more for less.</p>\
             <p>Keep an eye on your inbox: we'll follow up shortly with everything you need to get started.</p>\
             <p><a href=\"{site}\">Visit the site</a></p>\
             </body></html>",
            site = config.site_url
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::error::DeliveryError;
    use crate::store::types::Funnel;
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
        fn new(fail: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail,
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
                    body: "simulated".to_string(),
                })
            } else {
                Ok("re_ok".to_string())
            }
        }
    }

    fn submission() -> LeadSubmission {
        LeadSubmission {
            full_name: "Pat Doe".to_string(),
            email: "pat@example.com".to_string(),
            phone: Some("+1 555 0100".to_string()),
            source: "webinar".to_string(),
            funnel_slug: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            preferred_contact_time: Some("Evenings".to_string()),
            intent: Some("join_now".to_string()),
        }
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("a@b.example"));
        assert!(is_valid_email("  a@b.example  "));
        assert!(!is_valid_email("plainaddress"));
        assert!(!is_valid_email("@no-local.example"));
        assert!(!is_valid_email("a@nodomain"));
        assert!(!is_valid_email("a@.example"));
    }

    #[tokio::test]
    async fn test_submit_inserts_and_notifies() {
        let store = MemoryStore::new();
        let sender = RecordingSender::new(false);
        let config = test_config();

        let lead = submit_lead(&store, &sender, &config, submission())
            .await
            .unwrap();
        assert_eq!(lead.status, LeadStatus::Prospect);

        let calls = sender.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].to, vec!["leads@wanderlink.example"]);
        assert!(calls[0].subject.contains("ready to join"));
        assert_eq!(calls[1].to, vec!["pat@example.com"]);
        assert!(calls[1].subject.starts_with("Welcome, Pat"));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_submit() {
        let store = MemoryStore::new();
        let sender = RecordingSender::new(true);
        let config = test_config();

        let result = submit_lead(&store, &sender, &config, submission()).await;
        assert!(result.is_ok());
        assert_eq!(store.leads().await.len(), 1);
    }

    #[tokio::test]
    async fn test_funnel_slug_resolves_ambassador() {
        let store = MemoryStore::new();
        let sender = RecordingSender::new(false);
        let config = test_config();

        let ambassador_id = Uuid::new_v4();
        store
            .seed_funnel(Funnel {
                id: Uuid::new_v4(),
                user_id: ambassador_id,
                funnel_slug: "jordan".to_string(),
                active: true,
                headline: None,
                bio: None,
                hero_image_url: None,
                video_url: None,
                webhook_url: None,
            })
            .await;

        let mut sub = submission();
        sub.funnel_slug = Some("jordan".to_string());

        let lead = submit_lead(&store, &sender, &config, sub).await.unwrap();
        assert_eq!(lead.ambassador_id, Some(ambassador_id));
    }

    #[tokio::test]
    async fn test_invalid_submission_rejected() {
        let store = MemoryStore::new();
        let sender = RecordingSender::new(false);
        let config = test_config();

        let mut sub = submission();
        sub.email = "not-an-email".to_string();

        let err = submit_lead(&store, &sender, &config, sub).await.unwrap_err();
        assert!(matches!(err, LeadError::Invalid(_)));
        assert!(store.leads().await.is_empty());
        assert!(sender.calls().is_empty());
    }
}
