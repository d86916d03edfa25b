//! Batch queue processors.
//!
//! Two independent jobs, each invoked on a schedule: one drains due
//! scheduled posts to the automation webhook, the other drains the email
//! send queue to the provider. Both walk their batch sequentially and
//! isolate per-row failures; only a failure of the due-set query itself
//! aborts an invocation.

pub mod email_queue;
pub mod posts;
pub mod template;

use serde::{Deserialize, Serialize};

pub use email_queue::process_email_queue;
pub use posts::process_scheduled_posts;

/// Outcome of one scheduled-post invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRunSummary {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Outcome of one email-queue invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRunSummary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}
