use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use cloud_gateway::{Envelope, GatewayResult, ProviderId, Resource, ResourceGateway};
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Downloaded {
    pub key: String,
    pub size_bytes: u64,
    /// Where the bytes were written, when an output file was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_base64: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
    pub provider_id: ProviderId,
    pub key: String,
}

pub async fn list(
    gateway: &ResourceGateway,
    provider: &ProviderId,
    prefix: Option<&str>,
) -> Envelope<Vec<Resource>> {
    gateway.list(provider, prefix).await.into()
}

/// Store `bytes`, then record the upload with the log sink in the background.
/// The returned handle finishes once the audit event has been forwarded.
pub async fn store(
    gateway: &Arc<ResourceGateway>,
    provider: &ProviderId,
    key: &str,
    bytes: Vec<u8>,
) -> GatewayResult<(Resource, JoinHandle<()>)> {
    let resource = gateway.put(provider, key, bytes).await?;
    let audit = gateway.spawn_log_event(
        "cloud-gateway",
        "upload",
        json!({
            "providerId": resource.provider_id,
            "key": resource.key,
            "sizeBytes": resource.size_bytes,
        }),
    );
    Ok((resource, audit))
}

pub struct Uploaded {
    pub envelope: Envelope<Resource>,
    /// Audit event still in flight, if the upload succeeded.
    pub audit: Option<JoinHandle<()>>,
}

pub async fn upload(
    gateway: &Arc<ResourceGateway>,
    provider: &ProviderId,
    file: &Path,
    key: Option<&str>,
) -> Result<Uploaded> {
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let key = match key {
        Some(key) => key.to_owned(),
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .with_context(|| format!("cannot derive a key from {}", file.display()))?,
    };

    Ok(match store(gateway, provider, &key, bytes).await {
        Ok((resource, audit)) => Uploaded {
            envelope: Envelope::ok(resource),
            audit: Some(audit),
        },
        Err(e) => Uploaded {
            envelope: Envelope::failure(&e),
            audit: None,
        },
    })
}

pub async fn download(
    gateway: &ResourceGateway,
    provider: &ProviderId,
    key: &str,
    output: Option<&Path>,
) -> Result<Envelope<Downloaded>> {
    let bytes = match gateway.get(provider, key).await {
        Ok(bytes) => bytes,
        Err(e) => return Ok(Envelope::failure(&e)),
    };

    let mut downloaded = Downloaded {
        key: key.to_owned(),
        size_bytes: bytes.len() as u64,
        path: None,
        content_base64: None,
    };
    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            downloaded.path = Some(path.display().to_string());
        }
        None => {
            downloaded.content_base64 =
                Some(base64::engine::general_purpose::STANDARD.encode(&bytes));
        }
    }
    Ok(Envelope::ok(downloaded))
}

pub async fn delete(
    gateway: &ResourceGateway,
    provider: &ProviderId,
    key: &str,
) -> Envelope<Deleted> {
    gateway
        .delete(provider, key)
        .await
        .map(|()| Deleted {
            provider_id: provider.clone(),
            key: key.to_owned(),
        })
        .into()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use cloud_gateway::test_support::{HangingLogSink, InMemoryStorage, RecordingLogSink};
    use cloud_gateway::{ErrorKind, ProviderAdapter, ProviderConfig};

    use super::*;

    fn gateway() -> (Arc<ResourceGateway>, Arc<RecordingLogSink>) {
        let sink = Arc::new(RecordingLogSink::new("splunk"));
        let gateway = ResourceGateway::builder()
            .register(
                ProviderConfig::new("gcp"),
                ProviderAdapter::Storage(Arc::new(InMemoryStorage::new("gcp-mem"))),
            )
            .register(ProviderConfig::new("splunk"), ProviderAdapter::Log(sink.clone()))
            .build();
        (Arc::new(gateway), sink)
    }

    #[tokio::test]
    async fn upload_uses_file_name_and_logs() {
        let (gateway, sink) = gateway();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.xlsx");
        std::fs::write(&file, b"bytes").unwrap();

        let uploaded = upload(&gateway, &ProviderId::new("gcp"), &file, None)
            .await
            .unwrap();
        assert!(uploaded.envelope.success);
        assert_eq!(uploaded.envelope.data.unwrap().key, "report.xlsx");

        uploaded.audit.unwrap().await.unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sourcetype, "upload");
        assert_eq!(events[0].payload["sizeBytes"], 5);
    }

    #[tokio::test]
    async fn hung_log_sink_does_not_delay_store() {
        let gateway = Arc::new(
            ResourceGateway::builder()
                .register(
                    ProviderConfig::new("gcp"),
                    ProviderAdapter::storage(InMemoryStorage::new("gcp-mem")),
                )
                .register(
                    ProviderConfig::new("splunk").with_timeout(Duration::from_secs(2)),
                    ProviderAdapter::log(HangingLogSink::new("splunk")),
                )
                .build(),
        );

        let started = Instant::now();
        let (resource, audit) = store(&gateway, &ProviderId::new("gcp"), "a.txt", b"hi".to_vec())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(resource.size_bytes, 2);
        audit.abort();
    }

    #[tokio::test]
    async fn failed_upload_has_no_audit() {
        let (gateway, sink) = gateway();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let uploaded = upload(&gateway, &ProviderId::new("missing"), &file, None)
            .await
            .unwrap();
        assert!(!uploaded.envelope.success);
        assert!(uploaded.audit.is_none());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn download_to_file_and_inline() {
        let (gateway, _) = gateway();
        let gcp = ProviderId::new("gcp");
        gateway.put(&gcp, "a.bin", vec![1, 2, 3]).await.unwrap();

        let inline = download(&gateway, &gcp, "a.bin", None).await.unwrap();
        assert_eq!(inline.data.unwrap().content_base64.as_deref(), Some("AQID"));

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.bin");
        let written = download(&gateway, &gcp, "a.bin", Some(&out)).await.unwrap();
        assert!(written.success);
        assert_eq!(std::fs::read(&out).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn download_missing_is_a_failed_envelope() {
        let (gateway, _) = gateway();
        let envelope = download(&gateway, &ProviderId::new("gcp"), "nope", None)
            .await
            .unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.error.unwrap().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_reports_key() {
        let (gateway, _) = gateway();
        let envelope = delete(&gateway, &ProviderId::new("gcp"), "never.txt").await;
        assert!(envelope.success);
        assert_eq!(envelope.data.unwrap().key, "never.txt");
    }
}
