//! Transactional email delivery via the Resend API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DeliveryError;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// One outbound message.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

/// Response body from the provider on success.
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Sink for outbound email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send one message. Ok carries the provider-assigned message id.
    async fn send(&self, message: &OutboundEmail) -> Result<String, DeliveryError>;
}

/// Real provider client over reqwest.
pub struct ResendClient {
    client: Client,
    api_key: String,
    timeout: Duration,
}

impl ResendClient {
    pub fn new(client: Client, api_key: &str, timeout: Duration) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl EmailSender for ResendClient {
    async fn send(&self, message: &OutboundEmail) -> Result<String, DeliveryError> {
        info!(
            to = %message.to.join(","),
            subject_length = message.subject.len(),
            html_length = message.html.len(),
            "email_send_start"
        );

        let resp = self
            .client
            .post(RESEND_ENDPOINT)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let detail = serde_json::from_str::<ProviderResponse>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or(body);
            return Err(DeliveryError::Rejected {
                endpoint: "resend",
                status: status.as_u16(),
                body: detail,
            });
        }

        let provider_id = serde_json::from_str::<ProviderResponse>(&body)
            .ok()
            .and_then(|r| r.id)
            .unwrap_or_default();

        info!(
            to = %message.to.join(","),
            provider_id = %provider_id,
            "email_send_complete"
        );

        Ok(provider_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_email_serialization() {
        let message = OutboundEmail {
            from: "Wanderlink <hello@wanderlink.example>".to_string(),
            to: vec!["pat@example.com".to_string()],
            subject: "Welcome".to_string(),
            html: "<html><body>Hi</body></html>".to_string(),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["from"], "Wanderlink <hello@wanderlink.example>");
        assert_eq!(json["to"][0], "pat@example.com");
    }

    #[test]
    fn test_provider_response_parsing() {
        let ok: ProviderResponse = serde_json::from_str(r#"{"id": "re_abc123"}"#).unwrap();
        assert_eq!(ok.id.as_deref(), Some("re_abc123"));

        let err: ProviderResponse =
            serde_json::from_str(r#"{"message": "invalid recipient"}"#).unwrap();
        assert_eq!(err.message.as_deref(), Some("invalid recipient"));
        assert!(err.id.is_none());
    }
}
