use std::collections::HashSet;
use std::sync::Arc;

use cloud_gateway::{GatewayError, GatewayResult, StorageAdapter, StoredObject};
use futures::TryStreamExt;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use tracing::debug;

/// Build a Google Cloud Storage client. Credentials not given explicitly are
/// read from the `GOOGLE_*` environment variables.
pub fn gcs_store(
    bucket: &str,
    service_account_path: Option<&str>,
) -> GatewayResult<Arc<dyn ObjectStore>> {
    let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
    if let Some(path) = service_account_path {
        builder = builder.with_service_account_path(path);
    }
    let store = builder
        .build()
        .map_err(|e| GatewayError::internal(format!("gs://{bucket}: {e}")))?;
    Ok(Arc::new(store))
}

/// Build an Azure Blob Storage client. Credentials not given explicitly are
/// read from the `AZURE_*` environment variables.
pub fn azure_blob_store(
    account: &str,
    container: &str,
    access_key: Option<&str>,
) -> GatewayResult<Arc<dyn ObjectStore>> {
    let mut builder = MicrosoftAzureBuilder::from_env()
        .with_account(account)
        .with_container_name(container);
    if let Some(key) = access_key {
        builder = builder.with_access_key(key);
    }
    let store = builder
        .build()
        .map_err(|e| GatewayError::internal(format!("azure://{account}/{container}: {e}")))?;
    Ok(Arc::new(store))
}

/// [`StorageAdapter`] over any `object_store` backend.
///
/// Keys are relative to an optional root prefix, so several environments can
/// share one bucket.
pub struct ObjectStoreStorage {
    label: String,
    store: Arc<dyn ObjectStore>,
    root: Option<Path>,
}

impl ObjectStoreStorage {
    pub fn new(label: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            label: label.into(),
            store,
            root: None,
        }
    }

    pub fn with_root(mut self, root: &str) -> Self {
        let root = root.trim_matches('/');
        self.root = (!root.is_empty()).then(|| Path::from(root));
        self
    }

    fn location(&self, key: &str) -> Path {
        let key = key.trim_start_matches('/');
        match &self.root {
            Some(root) => Path::from(format!("{root}/{key}")),
            None => Path::from(key),
        }
    }

    /// Key as callers see it: the location with the root stripped.
    fn relative_key(&self, location: &Path) -> String {
        let location = location.to_string();
        if let Some(root) = &self.root
            && let Some(rest) = location.strip_prefix(&format!("{root}/"))
        {
            return rest.to_owned();
        }
        location
    }

    fn to_stored(&self, meta: &ObjectMeta) -> StoredObject {
        StoredObject {
            key: self.relative_key(&meta.location),
            size_bytes: meta.size as u64,
            last_modified: meta.last_modified,
        }
    }

    fn map_err(&self, err: object_store::Error) -> GatewayError {
        match err {
            object_store::Error::NotFound { path, .. } => {
                GatewayError::not_found(format!("{}: {path}", self.label))
            }
            object_store::Error::InvalidPath { source } => {
                GatewayError::internal(format!("{}: {source}", self.label))
            }
            object_store::Error::NotImplemented => {
                GatewayError::internal(format!("{}: operation not implemented", self.label))
            }
            other => GatewayError::unavailable(format!("{}: {other}", self.label)),
        }
    }
}

#[async_trait::async_trait]
impl StorageAdapter for ObjectStoreStorage {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list(&self, prefix: Option<&str>) -> GatewayResult<Vec<StoredObject>> {
        let prefix = prefix.unwrap_or("").trim_start_matches('/');

        // object_store prefixes match whole path segments, so list from the
        // enclosing directory and filter on the raw string.
        let directory = prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let scope = match (&self.root, directory.is_empty()) {
            (Some(_), _) => Some(self.location(directory)),
            (None, false) => Some(Path::from(directory)),
            (None, true) => None,
        };

        let metas: Vec<ObjectMeta> = self
            .store
            .list(scope.as_ref())
            .try_collect()
            .await
            .map_err(|e| self.map_err(e))?;

        let objects: Vec<StoredObject> = metas
            .iter()
            .map(|meta| self.to_stored(meta))
            .filter(|object| object.key.starts_with(prefix))
            .collect();

        // Zero-byte placeholders some consoles create for folders.
        let directories: HashSet<&str> = objects
            .iter()
            .filter_map(|object| object.key.rsplit_once('/').map(|(dir, _)| dir))
            .collect();
        let objects: Vec<StoredObject> = objects
            .iter()
            .filter(|object| {
                !(object.size_bytes == 0
                    && (object.key.ends_with('/') || directories.contains(object.key.as_str())))
            })
            .cloned()
            .collect();

        debug!(label = %self.label, prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> GatewayResult<StoredObject> {
        let location = self.location(key);
        self.store
            .put(&location, PutPayload::from(bytes))
            .await
            .map_err(|e| self.map_err(e))?;
        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(self.to_stored(&meta))
    }

    async fn get(&self, key: &str) -> GatewayResult<Vec<u8>> {
        let location = self.location(key);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| self.map_err(e))?;
        let bytes = result.bytes().await.map_err(|e| self.map_err(e))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, key: &str) -> GatewayResult<()> {
        match self.store.delete(&self.location(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(self.map_err(e)),
        }
    }

    async fn probe(&self) -> GatewayResult<()> {
        self.store
            .list_with_delimiter(self.root.as_ref())
            .await
            .map(|_| ())
            .map_err(|e| self.map_err(e))
    }
}
