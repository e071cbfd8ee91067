use base64::Engine;
use cloud_gateway::{GatewayError, GatewayResult, QueueAdapter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{error_for, transport_error};

/// Pub/Sub rejects messages whose encoded data exceeds 10 MB.
pub const MAX_MESSAGE_BYTES: u64 = 10_000_000;

/// Configuration for a Google Cloud Pub/Sub topic.
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    pub label: String,
    pub project: String,
    pub topic: String,
    /// OAuth bearer token.
    pub token: Option<String>,
    pub api_base_url: Option<String>,
}

/// Publishes to a Pub/Sub topic through the REST API.
pub struct PubSubPublisher {
    config: PubSubConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    messages: [OutgoingMessage<'a>; 1],
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    data: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

impl PubSubPublisher {
    pub fn new(config: PubSubConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_base(&self) -> &str {
        self.config
            .api_base_url
            .as_deref()
            .unwrap_or("https://pubsub.googleapis.com")
    }

    fn topic_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/topics/{}",
            self.api_base().trim_end_matches('/'),
            self.config.project,
            self.config.topic,
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait::async_trait]
impl QueueAdapter for PubSubPublisher {
    fn label(&self) -> &str {
        &self.config.label
    }

    async fn publish(&self, message: &str) -> GatewayResult<String> {
        let data = base64::engine::general_purpose::STANDARD.encode(message);
        let size = data.len() as u64;
        if size > MAX_MESSAGE_BYTES {
            return Err(GatewayError::PayloadTooLarge {
                size,
                limit: MAX_MESSAGE_BYTES,
            });
        }

        let url = format!("{}:publish", self.topic_url());
        let body = PublishRequest {
            messages: [OutgoingMessage { data: &data }],
        };

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(self.label(), e))?;

        if response.status().as_u16() == 413 {
            return Err(GatewayError::PayloadTooLarge {
                size,
                limit: MAX_MESSAGE_BYTES,
            });
        }
        if !response.status().is_success() {
            return Err(error_for(self.label(), response).await);
        }

        let parsed: PublishResponse = response
            .json()
            .await
            .map_err(|e| transport_error(self.label(), e))?;

        let id = parsed.message_ids.into_iter().next().ok_or_else(|| {
            GatewayError::internal(format!("{}: publish response had no message id", self.label()))
        })?;
        debug!(label = %self.config.label, message_id = %id, "published to pubsub");
        Ok(id)
    }

    async fn probe(&self) -> GatewayResult<()> {
        let response = self
            .authorize(self.client.get(self.topic_url()))
            .send()
            .await
            .map_err(|e| transport_error(self.label(), e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_for(self.label(), response).await)
        }
    }
}
