use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;

/// A named blob held by a storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub provider_id: ProviderId,
}

/// Acknowledgement returned by a queue provider for one published message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceipt {
    pub provider_id: ProviderId,
    pub message_id: String,
    pub published_at: DateTime<Utc>,
    /// Number of send attempts, 1 or 2.
    pub attempts: u32,
}

/// A structured event forwarded to the log sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub source: String,
    pub sourcetype: String,
    pub payload: serde_json::Value,
    pub time: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(
        source: impl Into<String>,
        sourcetype: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            source: source.into(),
            sourcetype: sourcetype.into(),
            payload,
            time: Utc::now(),
        }
    }
}

/// Health snapshot of one adapter, recomputed on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub provider_id: ProviderId,
    pub enabled: bool,
    pub reachable: bool,
    pub last_checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_serializes_camel_case() {
        let resource = Resource {
            key: "a.txt".into(),
            size_bytes: 3,
            last_modified: Utc::now(),
            provider_id: ProviderId::new("azure"),
        };
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["sizeBytes"], 3);
        assert_eq!(json["providerId"], "azure");
        assert!(json.get("lastModified").is_some());
    }

    #[test]
    fn status_omits_empty_detail() {
        let status = ProviderStatus {
            provider_id: ProviderId::new("gcp"),
            enabled: true,
            reachable: true,
            last_checked_at: Utc::now(),
            detail: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("detail").is_none());
        assert_eq!(json["reachable"], true);
    }
}
