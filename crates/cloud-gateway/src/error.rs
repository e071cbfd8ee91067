use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors surfaced by the gateway, regardless of which adapter served the request.
///
/// Adapters translate their native failures into one of these variants at their
/// own boundary; the gateway never re-interprets them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt file: {0}")]
    CorruptFile(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error taxonomy without the detail payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderUnavailable,
    NotFound,
    PayloadTooLarge,
    UnsupportedFormat,
    CorruptFile,
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ProviderUnavailable => "provider_unavailable",
            Self::NotFound => "not_found",
            Self::PayloadTooLarge => "payload_too_large",
            Self::UnsupportedFormat => "unsupported_format",
            Self::CorruptFile => "corrupt_file",
            Self::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

impl GatewayError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ProviderUnavailable(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::CorruptFile(_) => ErrorKind::CorruptFile,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Transport-level failures are the only ones eligible for the single publish retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }
}
