//! Delivery of scheduled posts to an ambassador's automation webhook.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::DeliveryError;

/// JSON body posted to the automation webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPayload {
    pub caption: String,
    pub image_url: String,
    pub platforms: Vec<String>,
    pub ambassador_name: String,
    pub post_id: Uuid,
    pub funnel_link: String,
}

/// Sink for composed post payloads.
#[async_trait]
pub trait SocialWebhook: Send + Sync {
    /// POST the payload to `url`. Ok means the endpoint answered 2xx.
    async fn deliver(&self, url: &str, payload: &PostPayload) -> Result<(), DeliveryError>;
}

/// Real webhook client over reqwest.
pub struct HttpWebhook {
    client: Client,
    timeout: Duration,
}

impl HttpWebhook {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl SocialWebhook for HttpWebhook {
    async fn deliver(&self, url: &str, payload: &PostPayload) -> Result<(), DeliveryError> {
        info!(
            post_id = %payload.post_id,
            url_length = url.len(),
            platforms = payload.platforms.len(),
            "webhook_delivery_start"
        );

        let resp = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                endpoint: "webhook",
                status: status.as_u16(),
                body,
            });
        }

        info!(
            post_id = %payload.post_id,
            status_code = status.as_u16(),
            "webhook_delivery_complete"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serialization() {
        let payload = PostPayload {
            caption: "See you there".to_string(),
            image_url: "https://cdn.example.com/a.jpg".to_string(),
            platforms: vec!["facebook".to_string(), "instagram".to_string()],
            ambassador_name: "Jordan Lee".to_string(),
            post_id: Uuid::nil(),
            funnel_link: "https://example.com/f/jordan?ref=social".to_string(),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["caption"], "See you there");
        assert_eq!(json["platforms"].as_array().unwrap().len(), 2);
        assert!(json["funnel_link"].as_str().unwrap().contains("/f/jordan"));
    }
}
