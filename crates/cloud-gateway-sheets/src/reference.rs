use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::fingerprint::Fingerprint;

/// Process-wide sequence so ids stay unique across every cache instance.
static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Assigns sheet reference ids of the form
/// `PREFIX-yyyyMMddHHmmss-FPRINT-SEQUENCE`, e.g. `EXCEL-20250101120000-BA7816-0001`.
#[derive(Debug, Clone)]
pub struct ReferenceIdGenerator {
    prefix: String,
}

impl Default for ReferenceIdGenerator {
    fn default() -> Self {
        Self::new("EXCEL")
    }
}

impl ReferenceIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = if prefix.trim().is_empty() {
            "CLD".to_owned()
        } else {
            prefix.trim().to_uppercase()
        };
        Self { prefix }
    }

    pub fn next(&self, fingerprint: &Fingerprint) -> String {
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{}-{}-{:04}",
            self.prefix,
            Utc::now().format("%Y%m%d%H%M%S"),
            fingerprint.short().to_uppercase(),
            sequence
        )
    }
}
