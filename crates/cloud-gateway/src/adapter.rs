use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::GatewayResult;
use crate::resource::LogEvent;

/// Object metadata as reported by a storage adapter, before the gateway
/// attaches the provider id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// Object storage backend (list/put/get/delete).
///
/// Implementations own their transport and authentication, and must map
/// every provider-native failure onto [`crate::GatewayError`].
#[async_trait::async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Human-readable label identifying the backend (e.g. `gs://bucket`).
    fn label(&self) -> &str;

    /// List objects whose key starts with `prefix`. Empty when nothing matches.
    async fn list(&self, prefix: Option<&str>) -> GatewayResult<Vec<StoredObject>>;

    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> GatewayResult<StoredObject>;

    async fn get(&self, key: &str) -> GatewayResult<Vec<u8>>;

    /// Delete `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> GatewayResult<()>;

    /// Cheap liveness check used by health aggregation.
    async fn probe(&self) -> GatewayResult<()>;
}

/// Message queue / pub-sub backend.
#[async_trait::async_trait]
pub trait QueueAdapter: Send + Sync {
    fn label(&self) -> &str;

    /// Send one message, returning the provider-assigned message id.
    async fn publish(&self, message: &str) -> GatewayResult<String>;

    async fn probe(&self) -> GatewayResult<()>;
}

/// Structured log ingestion backend.
#[async_trait::async_trait]
pub trait LogAdapter: Send + Sync {
    fn label(&self) -> &str;

    async fn log_event(&self, event: &LogEvent) -> GatewayResult<()>;

    async fn probe(&self) -> GatewayResult<()>;
}

/// A registered backend, tagged by the capability it offers.
///
/// The gateway dispatches on this tag; it never inspects the concrete adapter.
#[derive(Clone)]
pub enum ProviderAdapter {
    Storage(Arc<dyn StorageAdapter>),
    Queue(Arc<dyn QueueAdapter>),
    Log(Arc<dyn LogAdapter>),
}

impl ProviderAdapter {
    pub fn storage(adapter: impl StorageAdapter + 'static) -> Self {
        Self::Storage(Arc::new(adapter))
    }

    pub fn queue(adapter: impl QueueAdapter + 'static) -> Self {
        Self::Queue(Arc::new(adapter))
    }

    pub fn log(adapter: impl LogAdapter + 'static) -> Self {
        Self::Log(Arc::new(adapter))
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Storage(a) => a.label(),
            Self::Queue(a) => a.label(),
            Self::Log(a) => a.label(),
        }
    }

    /// Capability name used in error messages and health output.
    pub fn capability(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage",
            Self::Queue(_) => "queue",
            Self::Log(_) => "log",
        }
    }

    pub async fn probe(&self) -> GatewayResult<()> {
        match self {
            Self::Storage(a) => a.probe().await,
            Self::Queue(a) => a.probe().await,
            Self::Log(a) => a.probe().await,
        }
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProviderAdapter::{}({})", self.capability(), self.label())
    }
}
