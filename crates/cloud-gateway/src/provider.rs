use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-call timeout applied to adapter operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configured identifier of one backend integration (e.g. `gcp`, `azure`, `splunk`).
///
/// Resource keys are scoped to a provider: the same key may exist under two
/// providers independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Startup configuration for one adapter. Read once; never mutated at runtime.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub enabled: bool,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(id: impl Into<ProviderId>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
