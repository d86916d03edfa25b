//! Data store access for the queue processors and web handlers.
//!
//! The hosted backend is a plain relational store reached over its REST
//! interface; every mutation here is a single-row update keyed by primary
//! id, so there is no multi-row transaction requirement. The [`Store`]
//! trait captures exactly the operations the workers need, with two
//! implementations:
//!
//! - [`PostgrestStore`]: the production backend over HTTP
//! - [`MemoryStore`]: in-process maps for tests and local runs

pub mod memory;
pub mod postgrest;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;
pub use types::{
    EmailLog, EmailTemplate, Enrollment, EnrollmentStatus, Funnel, GalleryImage, Lead, LeadStatus,
    NewLead, PostAnalytics, PostStatus, Profile, QueueEntry, QueueStatus, ScheduledPost, Sequence,
    SequenceType, Subscription, SubscriptionStatus,
};

/// Insert payload for a delivery log row.
#[derive(Debug, Clone)]
pub struct NewEmailLog {
    pub subscription_id: Uuid,
    pub template_id: Uuid,
    pub email_to: String,
    pub subject: String,
    pub status: String,
    pub provider_id: Option<String>,
}

/// Typed access to the backend tables.
///
/// Claim methods (`claim_scheduled_post`, `claim_queue_entry`) are
/// conditional writes that only succeed while the row is still Pending
/// and report whether the claim won. Two overlapping invocations can
/// both read the same due row, but only one claim succeeds, so the row
/// is never delivered twice.
#[async_trait]
pub trait Store: Send + Sync {
    // -------------------------------------------------------------------------
    // Leads and funnels
    // -------------------------------------------------------------------------

    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError>;

    async fn funnel_by_slug(&self, slug: &str) -> Result<Option<Funnel>, StoreError>;

    async fn funnel_slug_for_user(&self, user_id: Uuid) -> Result<Option<String>, StoreError>;

    async fn profile_name(&self, user_id: Uuid) -> Result<Option<String>, StoreError>;

    // -------------------------------------------------------------------------
    // Scheduled posts
    // -------------------------------------------------------------------------

    /// Pending posts with `scheduled_time <= now`, earliest due first,
    /// capped at `limit`.
    async fn due_scheduled_posts(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, StoreError>;

    /// Move a post from Pending to Processing. Returns false if the row
    /// was no longer Pending (another invocation claimed it first).
    async fn claim_scheduled_post(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn mark_post_posted(&self, id: Uuid, posted_at: DateTime<Utc>)
        -> Result<(), StoreError>;

    async fn mark_post_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    async fn insert_post_analytics(
        &self,
        scheduled_post_id: Uuid,
        ambassador_id: Uuid,
        platform: &str,
    ) -> Result<(), StoreError>;

    // -------------------------------------------------------------------------
    // Click tracking
    // -------------------------------------------------------------------------

    async fn analytics_for(
        &self,
        scheduled_post_id: Uuid,
        platform: &str,
    ) -> Result<Option<PostAnalytics>, StoreError>;

    async fn increment_analytics_clicks(&self, id: Uuid) -> Result<(), StoreError>;

    // -------------------------------------------------------------------------
    // Email queue
    // -------------------------------------------------------------------------

    /// Pending queue entries with `scheduled_for <= now`, earliest due
    /// first, capped at `limit`.
    async fn due_queue_entries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, StoreError>;

    /// Move a queue entry from Pending to Processing and increment its
    /// attempt counter. Returns false if the row was no longer Pending.
    async fn claim_queue_entry(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn mark_queue_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn mark_queue_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    async fn mark_queue_cancelled(&self, id: Uuid) -> Result<(), StoreError>;

    /// Reset a failed attempt to Pending at a later due time, keeping
    /// the error visible to operators.
    async fn requeue_entry(
        &self,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;

    async fn insert_email_log(&self, log: NewEmailLog) -> Result<(), StoreError>;

    // -------------------------------------------------------------------------
    // Subscriptions, sequences, enrollments
    // -------------------------------------------------------------------------

    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>, StoreError>;

    async fn subscription_by_email(&self, email: &str) -> Result<Option<Subscription>, StoreError>;

    async fn template(&self, id: Uuid) -> Result<Option<EmailTemplate>, StoreError>;

    async fn enrollment(&self, id: Uuid) -> Result<Option<Enrollment>, StoreError>;

    async fn sequence(&self, id: Uuid) -> Result<Option<Sequence>, StoreError>;

    async fn set_enrollment_step(&self, id: Uuid, step: i32) -> Result<(), StoreError>;

    async fn mark_enrollment_converted(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn mark_enrollment_completed(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn active_enrollments(&self) -> Result<Vec<Enrollment>, StoreError>;

    /// Count of Pending or Processing queue entries for an enrollment.
    async fn outstanding_entries(&self, enrollment_id: Uuid) -> Result<u64, StoreError>;

    async fn user_id_by_email(&self, email: &str) -> Result<Option<Uuid>, StoreError>;

    async fn user_has_role(&self, user_id: Uuid, role: &str) -> Result<bool, StoreError>;

    // -------------------------------------------------------------------------
    // Unsubscribe
    // -------------------------------------------------------------------------

    /// Mark the subscription for `email` unsubscribed. Idempotent: a
    /// repeat call on an already-unsubscribed address succeeds.
    async fn mark_subscription_unsubscribed(
        &self,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn unsubscribe_active_enrollments(
        &self,
        subscription_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn cancel_pending_queue(&self, subscription_id: Uuid) -> Result<(), StoreError>;

    // -------------------------------------------------------------------------
    // Gallery
    // -------------------------------------------------------------------------

    /// Images for a funnel ordered by `sort_order` ascending.
    async fn gallery_images(&self, funnel_id: Uuid) -> Result<Vec<GalleryImage>, StoreError>;

    /// Rewrite the full sort order for a funnel's gallery.
    async fn set_gallery_order(&self, updates: &[(Uuid, i32)]) -> Result<(), StoreError>;
}
