//! Concrete provider adapters for the resource gateway.

mod http;

pub mod azure_queue;
pub mod object_storage;
pub mod pubsub;
pub mod splunk;

pub use azure_queue::{AzureQueue, AzureQueueConfig};
pub use object_storage::{ObjectStoreStorage, azure_blob_store, gcs_store};
pub use pubsub::{PubSubConfig, PubSubPublisher};
pub use splunk::{SplunkHec, SplunkHecConfig};
