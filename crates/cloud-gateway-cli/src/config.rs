use std::path::{Path, PathBuf};
use std::time::Duration;

use cloud_gateway_sheets::CacheConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CACHE_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_CACHE_AGE_SECS: u64 = 3_600;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("duplicate provider id `{0}`")]
    DuplicateProvider(String),
    #[error("log_sink `{0}` does not name a configured provider")]
    UnknownLogSink(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    /// Provider id used for `log` events. Defaults to the first log provider.
    pub log_sink: Option<String>,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSection {
    /// `0` disables the byte bound.
    #[serde(default = "default_cache_bytes")]
    pub max_total_bytes: u64,
    /// `0` disables expiry.
    #[serde(default = "default_cache_age_secs")]
    pub max_age_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// One configured backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEntry {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(flatten)]
    pub kind: ProviderKind,
}

/// The kind of backend, with its connection settings.
///
/// Fields ending in `_env` name an environment variable holding a secret.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ProviderKind {
    #[serde(rename = "gcs")]
    Gcs {
        bucket: String,
        service_account_path: Option<String>,
        root: Option<String>,
    },

    #[serde(rename = "azure-blob")]
    AzureBlob {
        account: String,
        container: String,
        access_key_env: Option<String>,
        root: Option<String>,
    },

    /// Process-local storage, lost on exit.
    #[serde(rename = "memory")]
    Memory { root: Option<String> },

    /// Directory on the local filesystem.
    #[serde(rename = "local")]
    Local { path: PathBuf, root: Option<String> },

    #[serde(rename = "pubsub")]
    PubSub {
        project: String,
        topic: String,
        token_env: Option<String>,
        api_base_url: Option<String>,
    },

    #[serde(rename = "azure-queue")]
    AzureQueue {
        account: String,
        queue: String,
        sas_token_env: Option<String>,
        endpoint: Option<String>,
    },

    #[serde(rename = "splunk-hec")]
    SplunkHec {
        url: String,
        token_env: String,
        index: Option<String>,
        host: Option<String>,
    },
}

impl ProviderKind {
    pub fn is_log_sink(&self) -> bool {
        matches!(self, Self::SplunkHec { .. })
    }
}

fn default_true() -> bool {
    true
}

fn default_max_payload_bytes() -> u64 {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_health_timeout_ms() -> u64 {
    DEFAULT_HEALTH_TIMEOUT_MS
}

fn default_provider_timeout_ms() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_MS
}

fn default_cache_bytes() -> u64 {
    DEFAULT_CACHE_BYTES
}

fn default_cache_age_secs() -> u64 {
    DEFAULT_CACHE_AGE_SECS
}

fn default_bind() -> String {
    "127.0.0.1:8081".into()
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_total_bytes: DEFAULT_CACHE_BYTES,
            max_age_secs: DEFAULT_CACHE_AGE_SECS,
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
            log_sink: None,
            cache: CacheSection::default(),
            server: ServerSection::default(),
            providers: default_providers(),
        }
    }
}

impl CacheSection {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_total_bytes: (self.max_total_bytes > 0).then_some(self.max_total_bytes),
            max_age: (self.max_age_secs > 0).then(|| Duration::from_secs(self.max_age_secs)),
        }
    }
}

impl AppConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.providers {
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::DuplicateProvider(entry.id.clone()));
            }
        }
        if let Some(sink) = &self.log_sink
            && !seen.contains(sink.as_str())
        {
            return Err(ConfigError::UnknownLogSink(sink.clone()));
        }
        Ok(())
    }
}

/// With no config file, a single in-memory provider so every command works
/// out of the box.
pub fn default_providers() -> Vec<ProviderEntry> {
    vec![ProviderEntry {
        id: "memory".into(),
        enabled: true,
        timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
        kind: ProviderKind::Memory { root: None },
    }]
}

/// Config file path: `~/.config/cloud-gateway/gateway.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cloud-gateway").join("gateway.toml"))
}

pub fn parse_config(contents: &str, path: &Path) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load config from `explicit`, or the default path, falling back to defaults
/// when the default file does not exist. An explicit path must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_owned(), true),
        None => match config_path() {
            Some(path) => (path, false),
            None => return Ok(AppConfig::default()),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => parse_config(&contents, &path),
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(AppConfig::default())
        }
        Err(source) => Err(ConfigError::Read { path, source }),
    }
}
