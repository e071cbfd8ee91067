use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, GatewayError, GatewayResult};

/// Uniform response shape consumed by the dashboard: a success flag plus either
/// a payload or an error description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error: &GatewayError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: error.kind(),
                message: error.to_string(),
            }),
            timestamp: Utc::now(),
        }
    }

    /// Generic notice plus the error's detail, as shown to end users.
    pub fn user_message(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| format!("Operation failed: {}", e.message))
    }
}

impl<T> From<GatewayResult<T>> for Envelope<T> {
    fn from(result: GatewayResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(&e),
        }
    }
}
