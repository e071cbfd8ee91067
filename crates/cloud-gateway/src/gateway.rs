use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::{LogAdapter, ProviderAdapter, QueueAdapter, StorageAdapter, StoredObject};
use crate::error::{GatewayError, GatewayResult};
use crate::provider::{ProviderConfig, ProviderId};
use crate::resource::{LogEvent, MessageReceipt, ProviderStatus, Resource};

/// Default upload limit (50 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Default bound on a single adapter's health probe.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

struct Registered {
    config: ProviderConfig,
    adapter: ProviderAdapter,
}

/// Single entry point for the dashboard: routes each request to the adapter
/// registered under its provider id and applies timeouts, size limits, and
/// the publish retry uniformly.
///
/// The gateway holds no resource state of its own.
pub struct ResourceGateway {
    providers: BTreeMap<ProviderId, Registered>,
    log_sink: Option<ProviderId>,
    max_payload_bytes: u64,
    health_timeout: Duration,
}

/// Builder for [`ResourceGateway`].
pub struct GatewayBuilder {
    providers: BTreeMap<ProviderId, Registered>,
    log_sink: Option<ProviderId>,
    max_payload_bytes: u64,
    health_timeout: Duration,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
            log_sink: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    /// Register an adapter. A later registration under the same id replaces the earlier one.
    pub fn register(mut self, config: ProviderConfig, adapter: ProviderAdapter) -> Self {
        self.providers
            .insert(config.id.clone(), Registered { config, adapter });
        self
    }

    /// Provider used by `log_event`. Defaults to the first registered log adapter.
    pub fn log_sink(mut self, id: impl Into<ProviderId>) -> Self {
        self.log_sink = Some(id.into());
        self
    }

    pub fn max_payload_bytes(mut self, limit: u64) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn build(self) -> ResourceGateway {
        let log_sink = self.log_sink.or_else(|| {
            self.providers
                .iter()
                .find(|(_, r)| matches!(r.adapter, ProviderAdapter::Log(_)))
                .map(|(id, _)| id.clone())
        });

        ResourceGateway {
            providers: self.providers,
            log_sink,
            max_payload_bytes: self.max_payload_bytes,
            health_timeout: self.health_timeout,
        }
    }
}

impl ResourceGateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Ids of every registered provider, in sorted order.
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.keys().cloned().collect()
    }

    pub fn max_payload_bytes(&self) -> u64 {
        self.max_payload_bytes
    }

    /// A view of this gateway whose calls use `timeout` instead of each provider's default.
    pub fn with_timeout(&self, timeout: Duration) -> TimedGateway<'_> {
        TimedGateway {
            gateway: self,
            timeout,
        }
    }

    pub async fn list(
        &self,
        provider: &ProviderId,
        prefix: Option<&str>,
    ) -> GatewayResult<Vec<Resource>> {
        self.list_inner(provider, prefix, None).await
    }

    pub async fn put(
        &self,
        provider: &ProviderId,
        key: &str,
        bytes: Vec<u8>,
    ) -> GatewayResult<Resource> {
        self.put_inner(provider, key, bytes, None).await
    }

    pub async fn get(&self, provider: &ProviderId, key: &str) -> GatewayResult<Vec<u8>> {
        self.get_inner(provider, key, None).await
    }

    pub async fn delete(&self, provider: &ProviderId, key: &str) -> GatewayResult<()> {
        self.delete_inner(provider, key, None).await
    }

    pub async fn publish(
        &self,
        provider: &ProviderId,
        message: &str,
    ) -> GatewayResult<MessageReceipt> {
        self.publish_inner(provider, message, None).await
    }

    /// Forward a structured event to the log sink.
    ///
    /// Never fails: sink errors, timeouts, and a missing or disabled sink are
    /// logged locally and swallowed.
    pub async fn log_event(
        &self,
        source: &str,
        sourcetype: &str,
        payload: serde_json::Value,
    ) {
        self.log_event_inner(LogEvent::new(source, sourcetype, payload), None)
            .await
    }

    /// [`log_event`](Self::log_event) on a background task, so the caller
    /// never waits on the sink. Await the handle to flush before exiting.
    pub fn spawn_log_event(
        self: &Arc<Self>,
        source: &str,
        sourcetype: &str,
        payload: serde_json::Value,
    ) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        let event = LogEvent::new(source, sourcetype, payload);
        tokio::spawn(async move { gateway.log_event_inner(event, None).await })
    }

    /// Probe every registered adapter in parallel.
    ///
    /// Each probe is bounded by the health timeout; a probe that errors or
    /// times out reports `reachable = false`. Disabled providers are not probed.
    pub async fn health(&self) -> BTreeMap<ProviderId, ProviderStatus> {
        let probes = self.providers.iter().map(|(id, registered)| async move {
            let (reachable, detail) = if !registered.config.enabled {
                (false, Some("disabled".to_owned()))
            } else {
                match tokio::time::timeout(self.health_timeout, registered.adapter.probe()).await
                {
                    Ok(Ok(())) => (true, None),
                    Ok(Err(e)) => (false, Some(e.to_string())),
                    Err(_) => (
                        false,
                        Some(format!(
                            "health probe timed out after {} ms",
                            self.health_timeout.as_millis()
                        )),
                    ),
                }
            };

            let status = ProviderStatus {
                provider_id: id.clone(),
                enabled: registered.config.enabled,
                reachable,
                last_checked_at: Utc::now(),
                detail,
            };
            (id.clone(), status)
        });

        join_all(probes).await.into_iter().collect()
    }

    fn resolve(&self, provider: &ProviderId) -> GatewayResult<&Registered> {
        let registered = self.providers.get(provider).ok_or_else(|| {
            GatewayError::unavailable(format!("provider {provider} is not configured"))
        })?;

        if !registered.config.enabled {
            return Err(GatewayError::unavailable(format!(
                "provider {provider} is disabled"
            )));
        }

        Ok(registered)
    }

    fn storage(
        &self,
        provider: &ProviderId,
    ) -> GatewayResult<(&ProviderConfig, &Arc<dyn StorageAdapter>)> {
        let registered = self.resolve(provider)?;
        match &registered.adapter {
            ProviderAdapter::Storage(adapter) => Ok((&registered.config, adapter)),
            other => Err(unsupported(provider, other, "storage")),
        }
    }

    fn queue(
        &self,
        provider: &ProviderId,
    ) -> GatewayResult<(&ProviderConfig, &Arc<dyn QueueAdapter>)> {
        let registered = self.resolve(provider)?;
        match &registered.adapter {
            ProviderAdapter::Queue(adapter) => Ok((&registered.config, adapter)),
            other => Err(unsupported(provider, other, "queue")),
        }
    }

    fn log_adapter(&self) -> GatewayResult<(&ProviderConfig, &Arc<dyn LogAdapter>)> {
        let id = self
            .log_sink
            .as_ref()
            .ok_or_else(|| GatewayError::unavailable("no log sink configured"))?;
        let registered = self.resolve(id)?;
        match &registered.adapter {
            ProviderAdapter::Log(adapter) => Ok((&registered.config, adapter)),
            other => Err(unsupported(id, other, "log")),
        }
    }

    async fn list_inner(
        &self,
        provider: &ProviderId,
        prefix: Option<&str>,
        timeout: Option<Duration>,
    ) -> GatewayResult<Vec<Resource>> {
        let (config, adapter) = self.storage(provider)?;
        let prefix = prefix.filter(|p| !p.is_empty());

        let mut objects = bounded(config, timeout, "list", adapter.list(prefix)).await?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        debug!(provider = %provider, count = objects.len(), "listed resources");
        Ok(objects
            .into_iter()
            .map(|o| into_resource(provider, o))
            .collect())
    }

    async fn put_inner(
        &self,
        provider: &ProviderId,
        key: &str,
        bytes: Vec<u8>,
        timeout: Option<Duration>,
    ) -> GatewayResult<Resource> {
        let (config, adapter) = self.storage(provider)?;

        let size = bytes.len() as u64;
        if size > self.max_payload_bytes {
            return Err(GatewayError::PayloadTooLarge {
                size,
                limit: self.max_payload_bytes,
            });
        }
        if key.trim_matches('/').is_empty() {
            return Err(GatewayError::internal("resource key must not be empty"));
        }

        let stored = bounded(config, timeout, "put", adapter.put(key, bytes)).await?;
        info!(provider = %provider, key, size, "uploaded resource");
        Ok(into_resource(provider, stored))
    }

    async fn get_inner(
        &self,
        provider: &ProviderId,
        key: &str,
        timeout: Option<Duration>,
    ) -> GatewayResult<Vec<u8>> {
        let (config, adapter) = self.storage(provider)?;
        if key.trim_matches('/').is_empty() {
            return Err(GatewayError::not_found(format!("{provider}/{key}")));
        }

        let bytes = bounded(config, timeout, "get", adapter.get(key)).await?;
        debug!(provider = %provider, key, size = bytes.len(), "downloaded resource");
        Ok(bytes)
    }

    async fn delete_inner(
        &self,
        provider: &ProviderId,
        key: &str,
        timeout: Option<Duration>,
    ) -> GatewayResult<()> {
        let (config, adapter) = self.storage(provider)?;
        if key.trim_matches('/').is_empty() {
            return Ok(());
        }

        match bounded(config, timeout, "delete", adapter.delete(key)).await {
            Ok(()) => {
                info!(provider = %provider, key, "deleted resource");
                Ok(())
            }
            Err(GatewayError::NotFound(_)) => {
                debug!(provider = %provider, key, "delete of missing resource");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn publish_inner(
        &self,
        provider: &ProviderId,
        message: &str,
        timeout: Option<Duration>,
    ) -> GatewayResult<MessageReceipt> {
        let (config, adapter) = self.queue(provider)?;

        let mut attempts = 1;
        let result = match bounded(config, timeout, "publish", adapter.publish(message)).await {
            Err(e) if e.is_transport() => {
                warn!(provider = %provider, error = %e, "publish failed, retrying once");
                attempts += 1;
                bounded(config, timeout, "publish", adapter.publish(message)).await
            }
            other => other,
        };

        let message_id = result?;
        info!(provider = %provider, message_id = %message_id, attempts, "published message");
        Ok(MessageReceipt {
            provider_id: provider.clone(),
            message_id,
            published_at: Utc::now(),
            attempts,
        })
    }

    async fn log_event_inner(&self, event: LogEvent, timeout: Option<Duration>) {
        let (config, adapter) = match self.log_adapter() {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, source = %event.source, "log event dropped");
                return;
            }
        };

        if let Err(e) = bounded(config, timeout, "log", adapter.log_event(&event)).await {
            warn!(
                provider = %config.id,
                error = %e,
                source = %event.source,
                sourcetype = %event.sourcetype,
                "failed to forward log event"
            );
        }
    }
}

/// [`ResourceGateway`] view with a caller-supplied timeout for every adapter call.
pub struct TimedGateway<'a> {
    gateway: &'a ResourceGateway,
    timeout: Duration,
}

impl TimedGateway<'_> {
    pub async fn list(
        &self,
        provider: &ProviderId,
        prefix: Option<&str>,
    ) -> GatewayResult<Vec<Resource>> {
        self.gateway
            .list_inner(provider, prefix, Some(self.timeout))
            .await
    }

    pub async fn put(
        &self,
        provider: &ProviderId,
        key: &str,
        bytes: Vec<u8>,
    ) -> GatewayResult<Resource> {
        self.gateway
            .put_inner(provider, key, bytes, Some(self.timeout))
            .await
    }

    pub async fn get(&self, provider: &ProviderId, key: &str) -> GatewayResult<Vec<u8>> {
        self.gateway.get_inner(provider, key, Some(self.timeout)).await
    }

    pub async fn delete(&self, provider: &ProviderId, key: &str) -> GatewayResult<()> {
        self.gateway
            .delete_inner(provider, key, Some(self.timeout))
            .await
    }

    pub async fn publish(
        &self,
        provider: &ProviderId,
        message: &str,
    ) -> GatewayResult<MessageReceipt> {
        self.gateway
            .publish_inner(provider, message, Some(self.timeout))
            .await
    }

    pub async fn log_event(&self, source: &str, sourcetype: &str, payload: serde_json::Value) {
        self.gateway
            .log_event_inner(
                LogEvent::new(source, sourcetype, payload),
                Some(self.timeout),
            )
            .await
    }
}

/// Run one adapter call under its timeout. Dropping the timed-out future
/// releases whatever connection it held.
async fn bounded<T>(
    config: &ProviderConfig,
    timeout: Option<Duration>,
    operation: &str,
    call: impl Future<Output = GatewayResult<T>>,
) -> GatewayResult<T> {
    let limit = timeout.unwrap_or(config.timeout);
    tokio::time::timeout(limit, call).await.map_err(|_| {
        GatewayError::unavailable(format!(
            "{} {operation} timed out after {} ms",
            config.id,
            limit.as_millis()
        ))
    })?
}

fn unsupported(provider: &ProviderId, adapter: &ProviderAdapter, wanted: &str) -> GatewayError {
    GatewayError::unavailable(format!(
        "provider {provider} is a {} provider and does not support {wanted} operations",
        adapter.capability()
    ))
}

fn into_resource(provider: &ProviderId, object: StoredObject) -> Resource {
    Resource {
        key: object.key,
        size_bytes: object.size_bytes,
        last_modified: object.last_modified,
        provider_id: provider.clone(),
    }
}
