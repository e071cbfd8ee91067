use base64::Engine;
use cloud_gateway::{GatewayError, GatewayResult, QueueAdapter};
use tracing::debug;

use crate::http::{error_for, transport_error};

/// Azure Storage Queue messages are capped at 64 KiB.
pub const MAX_MESSAGE_BYTES: u64 = 64 * 1024;

const API_VERSION: &str = "2021-08-06";

/// Configuration for an Azure Storage Queue.
#[derive(Debug, Clone)]
pub struct AzureQueueConfig {
    pub label: String,
    pub account: String,
    pub queue: String,
    /// Shared access signature query string, with or without the leading `?`.
    pub sas_token: Option<String>,
    /// Overrides `https://{account}.queue.core.windows.net`.
    pub endpoint: Option<String>,
}

/// Sends messages to an Azure Storage Queue through the REST API.
pub struct AzureQueue {
    config: AzureQueueConfig,
    client: reqwest::Client,
}

impl AzureQueue {
    pub fn new(config: AzureQueueConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn queue_url(&self, path: &str, query: Option<&str>) -> String {
        let base = match &self.config.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_owned(),
            None => format!("https://{}.queue.core.windows.net", self.config.account),
        };

        let sas = self
            .config
            .sas_token
            .as_deref()
            .map(|s| s.trim_start_matches('?'))
            .filter(|s| !s.is_empty());
        let params: Vec<&str> = query.into_iter().chain(sas).collect();

        let mut url = format!("{base}/{}{path}", self.config.queue);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }
}

/// `<MessageId>` from a Put Message response body.
fn message_id(body: &str) -> Option<&str> {
    let start = body.find("<MessageId>")? + "<MessageId>".len();
    let end = body[start..].find("</MessageId>")? + start;
    Some(&body[start..end])
}

#[async_trait::async_trait]
impl QueueAdapter for AzureQueue {
    fn label(&self) -> &str {
        &self.config.label
    }

    async fn publish(&self, message: &str) -> GatewayResult<String> {
        let text = base64::engine::general_purpose::STANDARD.encode(message);
        let size = text.len() as u64;
        if size > MAX_MESSAGE_BYTES {
            return Err(GatewayError::PayloadTooLarge {
                size,
                limit: MAX_MESSAGE_BYTES,
            });
        }
        let body = format!("<QueueMessage><MessageText>{text}</MessageText></QueueMessage>");

        let response = self
            .client
            .post(self.queue_url("/messages", None))
            .header("x-ms-version", API_VERSION)
            .header("Content-Type", "application/xml")
            .body(body)
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

        let request_id = response
            .headers()
            .get("x-ms-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(self.label(), e))?;

        let id = message_id(&body)
            .map(str::to_owned)
            .or(request_id)
            .ok_or_else(|| {
                GatewayError::internal(format!("{}: response had no message id", self.label()))
            })?;
        debug!(label = %self.config.label, message_id = %id, "queued azure message");
        Ok(id)
    }

    async fn probe(&self) -> GatewayResult<()> {
        let response = self
            .client
            .get(self.queue_url("", Some("comp=metadata")))
            .header("x-ms-version", API_VERSION)
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
