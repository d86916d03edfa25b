//! Configuration module for environment variable parsing.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hosted backend project URL
    pub supabase_url: String,

    /// Service-role key for the backend REST interface
    pub supabase_service_key: String,

    /// API key for the transactional email provider
    pub resend_api_key: String,

    /// From header for all outbound mail
    pub from_email: String,

    /// Recipient for new-lead alert emails
    pub admin_email: String,

    /// Public site base URL, used for tracking and unsubscribe links
    pub site_url: String,

    /// Maximum scheduled posts processed per invocation
    pub post_batch_size: usize,

    /// Maximum queued emails processed per invocation
    pub email_batch_size: usize,

    /// Attempts after which a queued email fails terminally
    pub max_email_attempts: i32,

    /// Delay before a failed email is retried
    pub retry_delay_minutes: i64,

    /// HTTP request timeout in milliseconds for all outbound calls
    pub request_timeout_ms: u64,

    /// Seconds between worker poll ticks
    pub poll_interval_secs: u64,

    /// Port for the web server to listen on
    pub port: u16,

    /// Optional HMAC key for signed unsubscribe tokens
    pub unsubscribe_signing_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| "http://localhost:54321".to_string()),

            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default(),

            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),

            from_email: env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "Wanderlink <hello@wanderlink.example>".to_string()),

            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "leads@wanderlink.example".to_string()),

            site_url: env::var("SITE_URL")
                .unwrap_or_else(|_| "https://wanderlink.example".to_string()),

            post_batch_size: parse_var("POST_BATCH_SIZE", 100),

            email_batch_size: parse_var("EMAIL_BATCH_SIZE", 50),

            max_email_attempts: parse_var("MAX_EMAIL_ATTEMPTS", 3),

            retry_delay_minutes: parse_var("RETRY_DELAY_MINUTES", 60),

            request_timeout_ms: parse_var("REQUEST_TIMEOUT_MS", 15_000),

            poll_interval_secs: parse_var("POLL_INTERVAL_SECS", 300),

            port: parse_var("PORT", 8080),

            unsubscribe_signing_key: env::var("UNSUBSCRIBE_SIGNING_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
        }
    }

    /// Per-request timeout for outbound HTTP calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Parse an environment variable, falling back to a default on absence
/// or a malformed value.
fn parse_var<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}
