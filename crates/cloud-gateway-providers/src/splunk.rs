use cloud_gateway::{GatewayError, GatewayResult, LogAdapter, LogEvent};
use serde::{Deserialize, Serialize};

use crate::http::{error_for, transport_error};

/// Configuration for a Splunk HTTP Event Collector endpoint.
#[derive(Debug, Clone)]
pub struct SplunkHecConfig {
    pub label: String,
    /// Base URL, e.g. `https://splunk.example.com:8088`.
    pub url: String,
    pub token: String,
    pub index: Option<String>,
    pub host: Option<String>,
}

/// Forwards log events to Splunk HEC.
pub struct SplunkHec {
    config: SplunkHecConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct HecEvent<'a> {
    event: &'a serde_json::Value,
    source: &'a str,
    sourcetype: &'a str,
    /// Epoch seconds with millisecond precision.
    time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct HecResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    text: String,
}

impl SplunkHec {
    pub fn new(config: SplunkHecConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.url.trim_end_matches('/'))
    }

    fn envelope<'a>(&'a self, event: &'a LogEvent) -> HecEvent<'a> {
        HecEvent {
            event: &event.payload,
            source: &event.source,
            sourcetype: &event.sourcetype,
            time: event.time.timestamp_millis() as f64 / 1000.0,
            index: self.config.index.as_deref(),
            host: self.config.host.as_deref(),
        }
    }
}

#[async_trait::async_trait]
impl LogAdapter for SplunkHec {
    fn label(&self) -> &str {
        &self.config.label
    }

    async fn log_event(&self, event: &LogEvent) -> GatewayResult<()> {
        let response = self
            .client
            .post(self.endpoint("/services/collector/event"))
            .header("Authorization", format!("Splunk {}", self.config.token))
            .json(&self.envelope(event))
            .send()
            .await
            .map_err(|e| transport_error(self.label(), e))?;

        if !response.status().is_success() {
            return Err(error_for(self.label(), response).await);
        }

        // HEC reports some rejections in the body of a 200.
        let ack: HecResponse = response
            .json()
            .await
            .map_err(|e| transport_error(self.label(), e))?;
        if ack.code != 0 {
            return Err(GatewayError::internal(format!(
                "{}: HEC code {}: {}",
                self.label(),
                ack.code,
                ack.text
            )));
        }
        Ok(())
    }

    async fn probe(&self) -> GatewayResult<()> {
        let response = self
            .client
            .get(self.endpoint("/services/collector/health"))
            .header("Authorization", format!("Splunk {}", self.config.token))
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
