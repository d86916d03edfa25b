//! Production store backed by the hosted backend's PostgREST interface.
//!
//! Every operation maps to a single `GET`/`POST`/`PATCH` against
//! `{base}/rest/v1/{table}` with `eq.`/`lte.`/`in.` filters. Conditional
//! claims add a status filter to the `PATCH` and ask for
//! `return=representation`, so the affected-row set tells us whether the
//! claim won without a second round trip.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

use super::types::{
    EmailTemplate, Enrollment, Funnel, GalleryImage, Lead, NewLead, PostAnalytics, QueueEntry,
    ScheduledPost, Sequence, Subscription,
};
use super::{NewEmailLog, Store};

/// PostgREST-backed [`Store`].
pub struct PostgrestStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl PostgrestStore {
    /// Build a store for `base_url` (the project URL, no trailing slash)
    /// authenticated with the service-role key.
    pub fn new(client: Client, base_url: &str, service_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }

    fn request(&self, method: Method, table: &str, query: &[(&str, String)]) -> reqwest::RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        self.client
            .request(method, url)
            .query(query)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &'static str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let resp = self.request(Method::GET, table, query).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::Backend {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|source| StoreError::Decode { table, source })
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &'static str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, StoreError> {
        let mut query: Vec<(&str, String)> = query.to_vec();
        query.push(("limit", "1".to_string()));
        let mut rows = self.select::<T>(table, &query).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// PATCH matching rows, returning how many were affected.
    async fn update<B: Serialize>(
        &self,
        table: &'static str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<usize, StoreError> {
        let resp = self
            .request(Method::PATCH, table, query)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::Backend {
                status: status.as_u16(),
                body: text,
            });
        }
        let rows: Vec<serde_json::Value> =
            serde_json::from_str(&text).map_err(|source| StoreError::Decode { table, source })?;
        debug!(table = table, affected = rows.len(), "store_update");
        Ok(rows.len())
    }

    async fn insert<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &'static str,
        body: &B,
    ) -> Result<T, StoreError> {
        let resp = self
            .request(Method::POST, table, &[])
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::Backend {
                status: status.as_u16(),
                body: text,
            });
        }
        let mut rows: Vec<T> =
            serde_json::from_str(&text).map_err(|source| StoreError::Decode { table, source })?;
        if rows.is_empty() {
            return Err(StoreError::NotFound { table });
        }
        Ok(rows.swap_remove(0))
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait::async_trait]
impl Store for PostgrestStore {
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        self.insert("leads", &lead).await
    }

    async fn funnel_by_slug(&self, slug: &str) -> Result<Option<Funnel>, StoreError> {
        self.select_one(
            "ambassador_funnels",
            &[("funnel_slug", format!("eq.{slug}"))],
        )
        .await
    }

    async fn funnel_slug_for_user(&self, user_id: Uuid) -> Result<Option<String>, StoreError> {
        let funnel: Option<Funnel> = self
            .select_one(
                "ambassador_funnels",
                &[("user_id", format!("eq.{user_id}"))],
            )
            .await?;
        Ok(funnel.map(|f| f.funnel_slug))
    }

    async fn profile_name(&self, user_id: Uuid) -> Result<Option<String>, StoreError> {
        let profile: Option<super::types::Profile> = self
            .select_one("profiles", &[("id", format!("eq.{user_id}"))])
            .await?;
        Ok(profile.and_then(|p| p.full_name))
    }

    async fn due_scheduled_posts(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        self.select(
            "scheduled_posts",
            &[
                ("status", "eq.pending".to_string()),
                ("scheduled_time", format!("lte.{}", iso(now))),
                ("order", "scheduled_time.asc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn claim_scheduled_post(&self, id: Uuid) -> Result<bool, StoreError> {
        let affected = self
            .update(
                "scheduled_posts",
                &[
                    ("id", format!("eq.{id}")),
                    ("status", "eq.pending".to_string()),
                ],
                &json!({ "status": "processing" }),
            )
            .await?;
        Ok(affected > 0)
    }

    async fn mark_post_posted(
        &self,
        id: Uuid,
        posted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(
            "scheduled_posts",
            &[("id", format!("eq.{id}"))],
            &json!({ "status": "posted", "posted_at": iso(posted_at) }),
        )
        .await?;
        Ok(())
    }

    async fn mark_post_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        self.update(
            "scheduled_posts",
            &[("id", format!("eq.{id}"))],
            &json!({ "status": "failed", "error_message": error }),
        )
        .await?;
        Ok(())
    }

    async fn insert_post_analytics(
        &self,
        scheduled_post_id: Uuid,
        ambassador_id: Uuid,
        platform: &str,
    ) -> Result<(), StoreError> {
        let _: serde_json::Value = self
            .insert(
                "social_post_analytics",
                &json!({
                    "scheduled_post_id": scheduled_post_id,
                    "ambassador_id": ambassador_id,
                    "platform": platform,
                    "clicks": 0,
                    "conversions": 0,
                }),
            )
            .await?;
        Ok(())
    }

    async fn analytics_for(
        &self,
        scheduled_post_id: Uuid,
        platform: &str,
    ) -> Result<Option<PostAnalytics>, StoreError> {
        self.select_one(
            "social_post_analytics",
            &[
                ("scheduled_post_id", format!("eq.{scheduled_post_id}")),
                ("platform", format!("eq.{platform}")),
            ],
        )
        .await
    }

    async fn increment_analytics_clicks(&self, id: Uuid) -> Result<(), StoreError> {
        // Read-then-write, matching the original click tracker. Lost
        // increments under concurrent clicks are tolerated.
        let row: Option<PostAnalytics> = self
            .select_one("social_post_analytics", &[("id", format!("eq.{id}"))])
            .await?;
        let row = row.ok_or(StoreError::NotFound {
            table: "social_post_analytics",
        })?;
        self.update(
            "social_post_analytics",
            &[("id", format!("eq.{id}"))],
            &json!({ "clicks": row.clicks + 1 }),
        )
        .await?;
        Ok(())
    }

    async fn due_queue_entries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        self.select(
            "email_queue",
            &[
                ("status", "eq.pending".to_string()),
                ("scheduled_for", format!("lte.{}", iso(now))),
                ("order", "scheduled_for.asc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn claim_queue_entry(&self, id: Uuid) -> Result<bool, StoreError> {
        // Attempt count is read first so the claim itself stays one
        // conditional write on the status column.
        let entry: Option<QueueEntry> = self
            .select_one("email_queue", &[("id", format!("eq.{id}"))])
            .await?;
        let entry = entry.ok_or(StoreError::NotFound {
            table: "email_queue",
        })?;
        let affected = self
            .update(
                "email_queue",
                &[
                    ("id", format!("eq.{id}")),
                    ("status", "eq.pending".to_string()),
                ],
                &json!({ "status": "processing", "attempts": entry.attempts + 1 }),
            )
            .await?;
        Ok(affected > 0)
    }

    async fn mark_queue_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.update(
            "email_queue",
            &[("id", format!("eq.{id}"))],
            &json!({ "status": "sent", "sent_at": iso(sent_at) }),
        )
        .await?;
        Ok(())
    }

    async fn mark_queue_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        self.update(
            "email_queue",
            &[("id", format!("eq.{id}"))],
            &json!({ "status": "failed", "last_error": error }),
        )
        .await?;
        Ok(())
    }

    async fn mark_queue_cancelled(&self, id: Uuid) -> Result<(), StoreError> {
        self.update(
            "email_queue",
            &[("id", format!("eq.{id}"))],
            &json!({ "status": "cancelled" }),
        )
        .await?;
        Ok(())
    }

    async fn requeue_entry(
        &self,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        self.update(
            "email_queue",
            &[("id", format!("eq.{id}"))],
            &json!({
                "status": "pending",
                "scheduled_for": iso(scheduled_for),
                "last_error": error,
            }),
        )
        .await?;
        Ok(())
    }

    async fn insert_email_log(&self, log: NewEmailLog) -> Result<(), StoreError> {
        let _: serde_json::Value = self
            .insert(
                "email_logs",
                &json!({
                    "subscription_id": log.subscription_id,
                    "template_id": log.template_id,
                    "email_to": log.email_to,
                    "subject": log.subject,
                    "status": log.status,
                    "provider_id": log.provider_id,
                }),
            )
            .await?;
        Ok(())
    }

    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        self.select_one("email_subscriptions", &[("id", format!("eq.{id}"))])
            .await
    }

    async fn subscription_by_email(&self, email: &str) -> Result<Option<Subscription>, StoreError> {
        self.select_one("email_subscriptions", &[("email", format!("eq.{email}"))])
            .await
    }

    async fn template(&self, id: Uuid) -> Result<Option<EmailTemplate>, StoreError> {
        self.select_one("email_templates", &[("id", format!("eq.{id}"))])
            .await
    }

    async fn enrollment(&self, id: Uuid) -> Result<Option<Enrollment>, StoreError> {
        self.select_one(
            "email_sequence_enrollments",
            &[("id", format!("eq.{id}"))],
        )
        .await
    }

    async fn sequence(&self, id: Uuid) -> Result<Option<Sequence>, StoreError> {
        self.select_one("email_sequences", &[("id", format!("eq.{id}"))])
            .await
    }

    async fn set_enrollment_step(&self, id: Uuid, step: i32) -> Result<(), StoreError> {
        self.update(
            "email_sequence_enrollments",
            &[("id", format!("eq.{id}"))],
            &json!({ "current_step": step }),
        )
        .await?;
        Ok(())
    }

    async fn mark_enrollment_converted(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(
            "email_sequence_enrollments",
            &[("id", format!("eq.{id}"))],
            &json!({ "status": "converted", "converted_at": iso(at) }),
        )
        .await?;
        Ok(())
    }

    async fn mark_enrollment_completed(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(
            "email_sequence_enrollments",
            &[("id", format!("eq.{id}"))],
            &json!({ "status": "completed", "completed_at": iso(at) }),
        )
        .await?;
        Ok(())
    }

    async fn active_enrollments(&self) -> Result<Vec<Enrollment>, StoreError> {
        self.select(
            "email_sequence_enrollments",
            &[("status", "eq.active".to_string())],
        )
        .await
    }

    async fn outstanding_entries(&self, enrollment_id: Uuid) -> Result<u64, StoreError> {
        let rows: Vec<serde_json::Value> = self
            .select(
                "email_queue",
                &[
                    ("select", "id".to_string()),
                    ("enrollment_id", format!("eq.{enrollment_id}")),
                    ("status", "in.(pending,processing)".to_string()),
                ],
            )
            .await?;
        Ok(rows.len() as u64)
    }

    async fn user_id_by_email(&self, email: &str) -> Result<Option<Uuid>, StoreError> {
        let profile: Option<super::types::Profile> = self
            .select_one("profiles", &[("email", format!("eq.{email}"))])
            .await?;
        Ok(profile.map(|p| p.id))
    }

    async fn user_has_role(&self, user_id: Uuid, role: &str) -> Result<bool, StoreError> {
        let rows: Vec<serde_json::Value> = self
            .select(
                "user_roles",
                &[
                    ("select", "role".to_string()),
                    ("user_id", format!("eq.{user_id}")),
                    ("role", format!("eq.{role}")),
                ],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn mark_subscription_unsubscribed(
        &self,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Filter-based write: zero affected rows (already unsubscribed
        // or unknown address) is still a success.
        self.update(
            "email_subscriptions",
            &[("email", format!("eq.{email}"))],
            &json!({ "status": "unsubscribed", "unsubscribed_at": iso(at) }),
        )
        .await?;
        Ok(())
    }

    async fn unsubscribe_active_enrollments(
        &self,
        subscription_id: Uuid,
    ) -> Result<(), StoreError> {
        self.update(
            "email_sequence_enrollments",
            &[
                ("subscription_id", format!("eq.{subscription_id}")),
                ("status", "eq.active".to_string()),
            ],
            &json!({ "status": "unsubscribed" }),
        )
        .await?;
        Ok(())
    }

    async fn cancel_pending_queue(&self, subscription_id: Uuid) -> Result<(), StoreError> {
        self.update(
            "email_queue",
            &[
                ("subscription_id", format!("eq.{subscription_id}")),
                ("status", "eq.pending".to_string()),
            ],
            &json!({ "status": "cancelled" }),
        )
        .await?;
        Ok(())
    }

    async fn gallery_images(&self, funnel_id: Uuid) -> Result<Vec<GalleryImage>, StoreError> {
        self.select(
            "funnel_gallery_images",
            &[
                ("funnel_id", format!("eq.{funnel_id}")),
                ("order", "sort_order.asc".to_string()),
            ],
        )
        .await
    }

    async fn set_gallery_order(&self, updates: &[(Uuid, i32)]) -> Result<(), StoreError> {
        for (id, sort_order) in updates {
            self.update(
                "funnel_gallery_images",
                &[("id", format!("eq.{id}"))],
                &json!({ "sort_order": sort_order }),
            )
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_is_utc_millis() {
        let ts = DateTime::parse_from_rfc3339("2024-01-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(iso(ts), "2024-01-02T00:00:00.000Z");
    }
}
