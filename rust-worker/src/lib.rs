//! Wanderlink - queue processing backend for the ambassador platform.
//!
//! This library provides shared modules for the two Wanderlink binaries:
//! - `wanderlink-web`: Web server for lead capture, unsubscribe, click
//!   tracking, and processor triggers
//! - `wanderlink-worker`: Interval poller that drains the scheduled-post
//!   and email send queues
//!
//! ## Architecture
//!
//! ```text
//! Forms → Web Server → leads table
//! Ambassadors → scheduled_posts → Post Processor → automation webhook
//! Sequences → email_queue → Email Processor → email provider
//! ```

pub mod chat;
pub mod config;
pub mod deliver;
pub mod error;
pub mod gallery;
pub mod leads;
pub mod process;
pub mod store;
pub mod token;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use deliver::{EmailSender, HttpWebhook, OutboundEmail, PostPayload, ResendClient, SocialWebhook};
pub use error::{DeliveryError, StoreError};
pub use process::{process_email_queue, process_scheduled_posts, EmailRunSummary, PostRunSummary};
pub use store::{MemoryStore, PostgrestStore, Store};
