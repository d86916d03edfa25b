//! Row types for the tables the workers read and write.
//!
//! Field names match the hosted backend's column names so rows serialize
//! straight onto the PostgREST wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Leads
// =============================================================================

/// Lifecycle status of a captured lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Prospect,
    Contacted,
    Converted,
}

/// A prospect record captured by one of the public forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub source: String,
    #[serde(default)]
    pub funnel_slug: Option<String>,
    #[serde(default)]
    pub ambassador_id: Option<Uuid>,
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
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new lead. The store assigns id and created_at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLead {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub source: String,
    #[serde(default)]
    pub funnel_slug: Option<String>,
    #[serde(default)]
    pub ambassador_id: Option<Uuid>,
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
    pub status: LeadStatus,
}

// =============================================================================
// Funnels and gallery
// =============================================================================

/// An ambassador's customizable public landing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Funnel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub funnel_slug: String,
    pub active: bool,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub hero_image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    /// The ambassador's current automation webhook. Scheduled posts copy
    /// this at creation time; the processor never re-reads it.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// One image in a funnel's ordered gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryImage {
    pub id: Uuid,
    pub funnel_id: Uuid,
    pub image_url: String,
    pub sort_order: i32,
}

// =============================================================================
// Scheduled posts
// =============================================================================

/// Lifecycle of a scheduled social post.
///
/// Pending → Processing → {Posted, Failed}. Cancelled is an operator
/// action; the only way back to Pending is an explicit operator retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Pending,
    Processing,
    Posted,
    Failed,
    Cancelled,
}

/// A queued social-media publish request.
///
/// Content fields and the webhook URL are frozen copies taken when the
/// post was scheduled, so later edits to the source content or the
/// ambassador's settings cannot change what gets delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: Uuid,
    pub ambassador_id: Uuid,
    #[serde(default)]
    pub custom_caption: Option<String>,
    #[serde(default)]
    pub content_file_url: Option<String>,
    #[serde(default)]
    pub content_thumbnail_url: Option<String>,
    pub platforms: Vec<String>,
    pub scheduled_time: DateTime<Utc>,
    pub webhook_url: String,
    pub status: PostStatus,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Per-platform click/conversion counters for a delivered post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostAnalytics {
    pub id: Uuid,
    pub scheduled_post_id: Uuid,
    pub ambassador_id: Uuid,
    pub platform: String,
    pub clicks: i64,
    pub conversions: i64,
}

// =============================================================================
// Email sequences
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Unsubscribed,
}

/// A recipient on the mailing list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

/// Which audience a sequence nurtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceType {
    Prospect,
    Customer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: Uuid,
    pub name: String,
    pub sequence_type: SequenceType,
}

/// One step in a sequence: an ordered, delayed email template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub step_order: i32,
    pub subject: String,
    pub html_content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Converted,
    Unsubscribed,
}

/// A recipient's progress through one sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub sequence_id: Uuid,
    pub current_step: i32,
    pub status: EnrollmentStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub converted_at: Option<DateTime<Utc>>,
}

/// Lifecycle of a queued send. Same monotonic shape as [`PostStatus`],
/// except the processor itself may reset a failed attempt to Pending
/// while the attempt counter is under the retry bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    Cancelled,
}

/// One pending send task: an enrollment paired with a template at a due
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub template_id: Uuid,
    pub enrollment_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
    pub attempts: i32,
    pub status: QueueStatus,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Delivery log row written after each provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailLog {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub template_id: Uuid,
    pub email_to: String,
    pub subject: String,
    pub status: String,
    #[serde(default)]
    pub provider_id: Option<String>,
}

// =============================================================================
// Identity
// =============================================================================

/// Display profile for an authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_status_serialization() {
        assert_eq!(
            serde_json::to_string(&PostStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&PostStatus::Posted).unwrap(),
            "\"posted\""
        );
        let parsed: PostStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, PostStatus::Failed);
    }

    #[test]
    fn test_scheduled_post_deserialization_defaults() {
        let json = r#"{
            "id": "6f7a2f6e-3f2a-4a2e-9b1c-111111111111",
            "ambassador_id": "6f7a2f6e-3f2a-4a2e-9b1c-222222222222",
            "platforms": ["facebook"],
            "scheduled_time": "2024-01-01T00:00:00Z",
            "webhook_url": "https://hooks.example.com/abc",
            "status": "pending"
        }"#;

        let post: ScheduledPost = serde_json::from_str(json).unwrap();
        assert_eq!(post.custom_caption, None);
        assert_eq!(post.posted_at, None);
        assert_eq!(post.status, PostStatus::Pending);
        assert_eq!(post.platforms, vec!["facebook"]);
    }

    #[test]
    fn test_queue_entry_roundtrip() {
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            scheduled_for: Utc::now(),
            attempts: 1,
            status: QueueStatus::Pending,
            sent_at: None,
            last_error: Some("provider returned 500".to_string()),
        };

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: QueueEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, entry.id);
        assert_eq!(parsed.status, QueueStatus::Pending);
        assert_eq!(parsed.last_error.as_deref(), Some("provider returned 500"));
    }
}
