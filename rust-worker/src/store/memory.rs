//! In-memory store used by tests and local runs.
//!
//! All tables live behind one `RwLock`; writes take the lock for the
//! duration of a single-row update, which mirrors the production store's
//! per-row update granularity closely enough for the processors.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

use super::types::{
    EmailLog, EmailTemplate, Enrollment, EnrollmentStatus, Funnel, GalleryImage, Lead, NewLead,
    PostAnalytics, PostStatus, Profile, QueueEntry, QueueStatus, ScheduledPost, Sequence,
    Subscription, SubscriptionStatus,
};
use super::{NewEmailLog, Store};

#[derive(Default)]
struct State {
    leads: HashMap<Uuid, Lead>,
    funnels: HashMap<Uuid, Funnel>,
    gallery: HashMap<Uuid, GalleryImage>,
    posts: HashMap<Uuid, ScheduledPost>,
    analytics: HashMap<Uuid, PostAnalytics>,
    subscriptions: HashMap<Uuid, Subscription>,
    sequences: HashMap<Uuid, Sequence>,
    templates: HashMap<Uuid, EmailTemplate>,
    enrollments: HashMap<Uuid, Enrollment>,
    queue: HashMap<Uuid, QueueEntry>,
    email_logs: Vec<EmailLog>,
    profiles: HashMap<Uuid, Profile>,
    /// user id -> role names
    roles: HashMap<Uuid, Vec<String>>,
}

/// In-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding helpers for tests and local setup.

    pub async fn seed_funnel(&self, funnel: Funnel) {
        self.state.write().await.funnels.insert(funnel.id, funnel);
    }

    pub async fn seed_profile(&self, profile: Profile) {
        self.state
            .write()
            .await
            .profiles
            .insert(profile.id, profile);
    }

    pub async fn seed_role(&self, user_id: Uuid, role: &str) {
        self.state
            .write()
            .await
            .roles
            .entry(user_id)
            .or_default()
            .push(role.to_string());
    }

    pub async fn seed_post(&self, post: ScheduledPost) {
        self.state.write().await.posts.insert(post.id, post);
    }

    pub async fn seed_subscription(&self, sub: Subscription) {
        self.state.write().await.subscriptions.insert(sub.id, sub);
    }

    pub async fn seed_sequence(&self, seq: Sequence) {
        self.state.write().await.sequences.insert(seq.id, seq);
    }

    pub async fn seed_template(&self, template: EmailTemplate) {
        self.state
            .write()
            .await
            .templates
            .insert(template.id, template);
    }

    pub async fn seed_enrollment(&self, enrollment: Enrollment) {
        self.state
            .write()
            .await
            .enrollments
            .insert(enrollment.id, enrollment);
    }

    pub async fn seed_queue_entry(&self, entry: QueueEntry) {
        self.state.write().await.queue.insert(entry.id, entry);
    }

    pub async fn seed_gallery_image(&self, image: GalleryImage) {
        self.state.write().await.gallery.insert(image.id, image);
    }

    // Inspection helpers for tests.

    pub async fn post(&self, id: Uuid) -> Option<ScheduledPost> {
        self.state.read().await.posts.get(&id).cloned()
    }

    pub async fn queue_entry(&self, id: Uuid) -> Option<QueueEntry> {
        self.state.read().await.queue.get(&id).cloned()
    }

    pub async fn enrollment_row(&self, id: Uuid) -> Option<Enrollment> {
        self.state.read().await.enrollments.get(&id).cloned()
    }

    pub async fn analytics_rows(&self, scheduled_post_id: Uuid) -> Vec<PostAnalytics> {
        self.state
            .read()
            .await
            .analytics
            .values()
            .filter(|a| a.scheduled_post_id == scheduled_post_id)
            .cloned()
            .collect()
    }

    pub async fn email_logs(&self) -> Vec<EmailLog> {
        self.state.read().await.email_logs.clone()
    }

    pub async fn leads(&self) -> Vec<Lead> {
        self.state.read().await.leads.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let row = Lead {
            id: Uuid::new_v4(),
            full_name: lead.full_name,
            email: lead.email,
            phone: lead.phone,
            source: lead.source,
            funnel_slug: lead.funnel_slug,
            ambassador_id: lead.ambassador_id,
            utm_source: lead.utm_source,
            utm_medium: lead.utm_medium,
            utm_campaign: lead.utm_campaign,
            preferred_contact_time: lead.preferred_contact_time,
            intent: lead.intent,
            status: lead.status,
            created_at: Utc::now(),
        };
        self.state.write().await.leads.insert(row.id, row.clone());
        Ok(row)
    }

    async fn funnel_by_slug(&self, slug: &str) -> Result<Option<Funnel>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .funnels
            .values()
            .find(|f| f.funnel_slug == slug)
            .cloned())
    }

    async fn funnel_slug_for_user(&self, user_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .funnels
            .values()
            .find(|f| f.user_id == user_id)
            .map(|f| f.funnel_slug.clone()))
    }

    async fn profile_name(&self, user_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .profiles
            .get(&user_id)
            .and_then(|p| p.full_name.clone()))
    }

    async fn due_scheduled_posts(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let state = self.state.read().await;
        let mut due: Vec<ScheduledPost> = state
            .posts
            .values()
            .filter(|p| p.status == PostStatus::Pending && p.scheduled_time <= now)
            .cloned()
            .collect();
        due.sort_by_key(|p| p.scheduled_time);
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_scheduled_post(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.posts.get_mut(&id) {
            Some(post) if post.status == PostStatus::Pending => {
                post.status = PostStatus::Processing;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                table: "scheduled_posts",
            }),
        }
    }

    async fn mark_post_posted(
        &self,
        id: Uuid,
        posted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let post = state.posts.get_mut(&id).ok_or(StoreError::NotFound {
            table: "scheduled_posts",
        })?;
        post.status = PostStatus::Posted;
        post.posted_at = Some(posted_at);
        Ok(())
    }

    async fn mark_post_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let post = state.posts.get_mut(&id).ok_or(StoreError::NotFound {
            table: "scheduled_posts",
        })?;
        post.status = PostStatus::Failed;
        post.error_message = Some(error.to_string());
        Ok(())
    }

    async fn insert_post_analytics(
        &self,
        scheduled_post_id: Uuid,
        ambassador_id: Uuid,
        platform: &str,
    ) -> Result<(), StoreError> {
        let row = PostAnalytics {
            id: Uuid::new_v4(),
            scheduled_post_id,
            ambassador_id,
            platform: platform.to_string(),
            clicks: 0,
            conversions: 0,
        };
        self.state.write().await.analytics.insert(row.id, row);
        Ok(())
    }

    async fn analytics_for(
        &self,
        scheduled_post_id: Uuid,
        platform: &str,
    ) -> Result<Option<PostAnalytics>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .analytics
            .values()
            .find(|a| a.scheduled_post_id == scheduled_post_id && a.platform == platform)
            .cloned())
    }

    async fn increment_analytics_clicks(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let row = state.analytics.get_mut(&id).ok_or(StoreError::NotFound {
            table: "social_post_analytics",
        })?;
        row.clicks += 1;
        Ok(())
    }

    async fn due_queue_entries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        let state = self.state.read().await;
        let mut due: Vec<QueueEntry> = state
            .queue
            .values()
            .filter(|e| e.status == QueueStatus::Pending && e.scheduled_for <= now)
            .cloned()
            .collect();
        due.sort_by_key(|e| e.scheduled_for);
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_queue_entry(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.queue.get_mut(&id) {
            Some(entry) if entry.status == QueueStatus::Pending => {
                entry.status = QueueStatus::Processing;
                entry.attempts += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                table: "email_queue",
            }),
        }
    }

    async fn mark_queue_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let entry = state.queue.get_mut(&id).ok_or(StoreError::NotFound {
            table: "email_queue",
        })?;
        entry.status = QueueStatus::Sent;
        entry.sent_at = Some(sent_at);
        Ok(())
    }

    async fn mark_queue_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let entry = state.queue.get_mut(&id).ok_or(StoreError::NotFound {
            table: "email_queue",
        })?;
        entry.status = QueueStatus::Failed;
        entry.last_error = Some(error.to_string());
        Ok(())
    }

    async fn mark_queue_cancelled(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let entry = state.queue.get_mut(&id).ok_or(StoreError::NotFound {
            table: "email_queue",
        })?;
        entry.status = QueueStatus::Cancelled;
        Ok(())
    }

    async fn requeue_entry(
        &self,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let entry = state.queue.get_mut(&id).ok_or(StoreError::NotFound {
            table: "email_queue",
        })?;
        entry.status = QueueStatus::Pending;
        entry.scheduled_for = scheduled_for;
        entry.last_error = Some(error.to_string());
        Ok(())
    }

    async fn insert_email_log(&self, log: NewEmailLog) -> Result<(), StoreError> {
        let row = EmailLog {
            id: Uuid::new_v4(),
            subscription_id: log.subscription_id,
            template_id: log.template_id,
            email_to: log.email_to,
            subject: log.subject,
            status: log.status,
            provider_id: log.provider_id,
        };
        self.state.write().await.email_logs.push(row);
        Ok(())
    }

    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        Ok(self.state.read().await.subscriptions.get(&id).cloned())
    }

    async fn subscription_by_email(&self, email: &str) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .values()
            .find(|s| s.email == email)
            .cloned())
    }

    async fn template(&self, id: Uuid) -> Result<Option<EmailTemplate>, StoreError> {
        Ok(self.state.read().await.templates.get(&id).cloned())
    }

    async fn enrollment(&self, id: Uuid) -> Result<Option<Enrollment>, StoreError> {
        Ok(self.state.read().await.enrollments.get(&id).cloned())
    }

    async fn sequence(&self, id: Uuid) -> Result<Option<Sequence>, StoreError> {
        Ok(self.state.read().await.sequences.get(&id).cloned())
    }

    async fn set_enrollment_step(&self, id: Uuid, step: i32) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let row = state.enrollments.get_mut(&id).ok_or(StoreError::NotFound {
            table: "email_sequence_enrollments",
        })?;
        row.current_step = step;
        Ok(())
    }

    async fn mark_enrollment_converted(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let row = state.enrollments.get_mut(&id).ok_or(StoreError::NotFound {
            table: "email_sequence_enrollments",
        })?;
        row.status = EnrollmentStatus::Converted;
        row.converted_at = Some(at);
        Ok(())
    }

    async fn mark_enrollment_completed(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let row = state.enrollments.get_mut(&id).ok_or(StoreError::NotFound {
            table: "email_sequence_enrollments",
        })?;
        row.status = EnrollmentStatus::Completed;
        row.completed_at = Some(at);
        Ok(())
    }

    async fn active_enrollments(&self) -> Result<Vec<Enrollment>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .enrollments
            .values()
            .filter(|e| e.status == EnrollmentStatus::Active)
            .cloned()
            .collect())
    }

    async fn outstanding_entries(&self, enrollment_id: Uuid) -> Result<u64, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .queue
            .values()
            .filter(|e| {
                e.enrollment_id == enrollment_id
                    && matches!(e.status, QueueStatus::Pending | QueueStatus::Processing)
            })
            .count() as u64)
    }

    async fn user_id_by_email(&self, email: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .profiles
            .values()
            .find(|p| p.email.as_deref() == Some(email))
            .map(|p| p.id))
    }

    async fn user_has_role(&self, user_id: Uuid, role: &str) -> Result<bool, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .roles
            .get(&user_id)
            .map(|roles| roles.iter().any(|r| r == role))
            .unwrap_or(false))
    }

    async fn mark_subscription_unsubscribed(
        &self,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        // Filter-based update like the production store: zero matching
        // rows is a success, which keeps unsubscribe idempotent.
        for sub in state.subscriptions.values_mut() {
            if sub.email == email && sub.status != SubscriptionStatus::Unsubscribed {
                sub.status = SubscriptionStatus::Unsubscribed;
                sub.unsubscribed_at = Some(at);
            }
        }
        Ok(())
    }

    async fn unsubscribe_active_enrollments(
        &self,
        subscription_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for row in state.enrollments.values_mut() {
            if row.subscription_id == subscription_id && row.status == EnrollmentStatus::Active {
                row.status = EnrollmentStatus::Unsubscribed;
            }
        }
        Ok(())
    }

    async fn cancel_pending_queue(&self, subscription_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for entry in state.queue.values_mut() {
            if entry.subscription_id == subscription_id && entry.status == QueueStatus::Pending {
                entry.status = QueueStatus::Cancelled;
            }
        }
        Ok(())
    }

    async fn gallery_images(&self, funnel_id: Uuid) -> Result<Vec<GalleryImage>, StoreError> {
        let state = self.state.read().await;
        let mut images: Vec<GalleryImage> = state
            .gallery
            .values()
            .filter(|i| i.funnel_id == funnel_id)
            .cloned()
            .collect();
        images.sort_by_key(|i| i.sort_order);
        Ok(images)
    }

    async fn set_gallery_order(&self, updates: &[(Uuid, i32)]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for (id, sort_order) in updates {
            let image = state.gallery.get_mut(id).ok_or(StoreError::NotFound {
                table: "funnel_gallery_images",
            })?;
            image.sort_order = *sort_order;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::LeadStatus;

    fn pending_post(scheduled_time: DateTime<Utc>) -> ScheduledPost {
        ScheduledPost {
            id: Uuid::new_v4(),
            ambassador_id: Uuid::new_v4(),
            custom_caption: None,
            content_file_url: Some("https://cdn.example.com/a.jpg".to_string()),
            content_thumbnail_url: None,
            platforms: vec!["facebook".to_string()],
            scheduled_time,
            webhook_url: "https://hooks.example.com/x".to_string(),
            status: PostStatus::Pending,
            posted_at: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_due_posts_ordered_and_capped() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let late = pending_post(now - chrono::Duration::minutes(1));
        let early = pending_post(now - chrono::Duration::hours(2));
        let future = pending_post(now + chrono::Duration::hours(1));
        store.seed_post(late.clone()).await;
        store.seed_post(early.clone()).await;
        store.seed_post(future).await;

        let due = store.due_scheduled_posts(now, 100).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, early.id);
        assert_eq!(due[1].id, late.id);

        let capped = store.due_scheduled_posts(now, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].id, early.id);
    }

    #[tokio::test]
    async fn test_claim_post_wins_once() {
        let store = MemoryStore::new();
        let post = pending_post(Utc::now());
        store.seed_post(post.clone()).await;

        assert!(store.claim_scheduled_post(post.id).await.unwrap());
        assert!(!store.claim_scheduled_post(post.id).await.unwrap());
        assert_eq!(
            store.post(post.id).await.unwrap().status,
            PostStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_claim_queue_entry_increments_attempts() {
        let store = MemoryStore::new();
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            scheduled_for: Utc::now(),
            attempts: 0,
            status: QueueStatus::Pending,
            sent_at: None,
            last_error: None,
        };
        store.seed_queue_entry(entry.clone()).await;

        assert!(store.claim_queue_entry(entry.id).await.unwrap());
        let claimed = store.queue_entry(entry.id).await.unwrap();
        assert_eq!(claimed.status, QueueStatus::Processing);
        assert_eq!(claimed.attempts, 1);

        assert!(!store.claim_queue_entry(entry.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let store = MemoryStore::new();
        let sub = Subscription {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            first_name: None,
            status: SubscriptionStatus::Active,
            unsubscribed_at: None,
        };
        store.seed_subscription(sub.clone()).await;

        let now = Utc::now();
        store
            .mark_subscription_unsubscribed("a@example.com", now)
            .await
            .unwrap();
        store
            .mark_subscription_unsubscribed("a@example.com", now)
            .await
            .unwrap();

        let row = store.subscription(sub.id).await.unwrap().unwrap();
        assert_eq!(row.status, SubscriptionStatus::Unsubscribed);
        assert!(row.unsubscribed_at.is_some());
    }

    #[tokio::test]
    async fn test_insert_lead_assigns_identity() {
        let store = MemoryStore::new();
        let lead = store
            .insert_lead(NewLead {
                full_name: "Pat Doe".to_string(),
                email: "pat@example.com".to_string(),
                phone: None,
                source: "webinar".to_string(),
                funnel_slug: None,
                ambassador_id: None,
                utm_source: None,
                utm_medium: None,
                utm_campaign: None,
                preferred_contact_time: None,
                intent: None,
                status: LeadStatus::Prospect,
            })
            .await
            .unwrap();

        assert_eq!(store.leads().await.len(), 1);
        assert_eq!(lead.status, LeadStatus::Prospect);
    }
}
