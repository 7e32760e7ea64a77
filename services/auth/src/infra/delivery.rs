use reqwest::Client;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use ridepool_domain::channel::Channel;

use crate::domain::repository::MessageSender;
use crate::error::AuthServiceError;

/// [`MessageSender`] that posts to a delivery webhook (SMS / email gateway).
///
/// Without a URL it only logs a masked notice, which is enough for local runs.
#[derive(Clone)]
pub struct WebhookMessageSender {
    client: Client,
    url: Option<String>,
}

impl WebhookMessageSender {
    pub fn new(client: Client, url: Option<String>) -> Self {
        Self { client, url }
    }
}

impl MessageSender for WebhookMessageSender {
    async fn send(&self, channel: &Channel, message: &str) -> Result<String, AuthServiceError> {
        let delivery_id = Uuid::new_v4().to_string();
        let Some(url) = &self.url else {
            info!(channel = %channel, delivery_id, "no delivery url configured, message dropped");
            return Ok(delivery_id);
        };

        let response = self
            .client
            .post(url)
            .json(&json!({
                "delivery_id": delivery_id,
                "channel": channel.kind(),
                "to": channel.address(),
                "message": message,
            }))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("delivery request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("delivery gateway returned {}", response.status()).into());
        }
        Ok(delivery_id)
    }
}
