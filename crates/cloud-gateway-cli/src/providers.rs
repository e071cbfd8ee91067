use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cloud_gateway::{GatewayBuilder, ProviderAdapter, ProviderConfig, ResourceGateway};
use cloud_gateway_providers::{
    AzureQueue, AzureQueueConfig, ObjectStoreStorage, PubSubConfig, PubSubPublisher, SplunkHec,
    SplunkHecConfig, azure_blob_store, gcs_store,
};
use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;

use crate::config::{AppConfig, ProviderEntry, ProviderKind};

fn secret(var: Option<&str>) -> Option<String> {
    var.and_then(|name| std::env::var(name).ok())
}

fn storage(entry: &ProviderEntry, store: Arc<dyn ObjectStore>, root: Option<&str>) -> ProviderAdapter {
    let mut adapter = ObjectStoreStorage::new(entry.id.clone(), store);
    if let Some(root) = root {
        adapter = adapter.with_root(root);
    }
    ProviderAdapter::storage(adapter)
}

fn build_adapter(entry: &ProviderEntry) -> Result<ProviderAdapter> {
    let adapter = match &entry.kind {
        ProviderKind::Gcs {
            bucket,
            service_account_path,
            root,
        } => {
            let store = gcs_store(bucket, service_account_path.as_deref())?;
            storage(entry, store, root.as_deref())
        }
        ProviderKind::AzureBlob {
            account,
            container,
            access_key_env,
            root,
        } => {
            let key = secret(access_key_env.as_deref());
            let store = azure_blob_store(account, container, key.as_deref())?;
            storage(entry, store, root.as_deref())
        }
        ProviderKind::Memory { root } => storage(entry, Arc::new(InMemory::new()), root.as_deref()),
        ProviderKind::Local { path, root } => {
            std::fs::create_dir_all(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let store = LocalFileSystem::new_with_prefix(path)
                .with_context(|| format!("invalid local storage path {}", path.display()))?;
            storage(entry, Arc::new(store), root.as_deref())
        }
        ProviderKind::PubSub {
            project,
            topic,
            token_env,
            api_base_url,
        } => ProviderAdapter::queue(PubSubPublisher::new(PubSubConfig {
            label: entry.id.clone(),
            project: project.clone(),
            topic: topic.clone(),
            token: secret(token_env.as_deref()),
            api_base_url: api_base_url.clone(),
        })),
        ProviderKind::AzureQueue {
            account,
            queue,
            sas_token_env,
            endpoint,
        } => ProviderAdapter::queue(AzureQueue::new(AzureQueueConfig {
            label: entry.id.clone(),
            account: account.clone(),
            queue: queue.clone(),
            sas_token: secret(sas_token_env.as_deref()),
            endpoint: endpoint.clone(),
        })),
        ProviderKind::SplunkHec {
            url,
            token_env,
            index,
            host,
        } => ProviderAdapter::log(SplunkHec::new(SplunkHecConfig {
            label: entry.id.clone(),
            url: url.clone(),
            token: secret(Some(token_env)).unwrap_or_default(),
            index: index.clone(),
            host: host.clone().or_else(|| std::env::var("HOSTNAME").ok()),
        })),
    };
    Ok(adapter)
}

/// Construct every configured adapter and register it with a new gateway.
pub fn build_gateway(config: &AppConfig) -> Result<ResourceGateway> {
    let mut builder: GatewayBuilder = ResourceGateway::builder()
        .max_payload_bytes(config.max_payload_bytes)
        .health_timeout(config.health_timeout());

    for entry in &config.providers {
        let adapter = build_adapter(entry)
            .with_context(|| format!("failed to configure provider `{}`", entry.id))?;
        let provider = ProviderConfig::new(entry.id.as_str())
            .with_enabled(entry.enabled)
            .with_timeout(Duration::from_millis(entry.timeout_ms));
        tracing::debug!(
            provider = %entry.id,
            capability = adapter.capability(),
            enabled = entry.enabled,
            "registered provider"
        );
        builder = builder.register(provider, adapter);
    }

    if let Some(sink) = &config.log_sink {
        builder = builder.log_sink(sink.as_str());
    } else if !config.providers.iter().any(|p| p.kind.is_log_sink()) {
        tracing::debug!("no log sink configured, log events will be dropped");
    }

    Ok(builder.build())
}
