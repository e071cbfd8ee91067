pub mod adapter;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod resource;

pub use adapter::{LogAdapter, ProviderAdapter, QueueAdapter, StorageAdapter, StoredObject};
pub use envelope::{Envelope, ErrorBody};
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use gateway::{GatewayBuilder, ResourceGateway, TimedGateway};
pub use provider::{ProviderConfig, ProviderId};
pub use resource::{LogEvent, MessageReceipt, ProviderStatus, Resource};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
