//! Outbound delivery: the automation webhook and the email provider.
//!
//! Both are plain HTTP POSTs where any 2xx is success and anything else
//! (including transport errors) is a failure the caller records on the
//! row. The traits exist so the processors can be exercised against
//! recording doubles in tests.

pub mod email;
pub mod webhook;

pub use email::{EmailSender, OutboundEmail, ResendClient};
pub use webhook::{HttpWebhook, PostPayload, SocialWebhook};
