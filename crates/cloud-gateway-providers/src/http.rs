use cloud_gateway::GatewayError;
use reqwest::StatusCode;

/// Map a non-success HTTP status onto the gateway taxonomy.
///
/// 413 is left to the caller, which knows the limit it was enforcing.
pub(crate) fn status_error(label: &str, status: StatusCode, body: &str) -> GatewayError {
    let detail = if body.is_empty() {
        format!("{label}: HTTP {status}")
    } else {
        format!("{label}: HTTP {status}: {}", truncate(body, 200))
    };

    match status.as_u16() {
        404 => GatewayError::NotFound(detail),
        401 | 403 | 408 | 429 => GatewayError::ProviderUnavailable(detail),
        s if s >= 500 => GatewayError::ProviderUnavailable(detail),
        _ => GatewayError::Internal(detail),
    }
}

/// Connection, timeout and protocol failures are transport errors; a body
/// that fails to decode is not.
pub(crate) fn transport_error(label: &str, err: reqwest::Error) -> GatewayError {
    if err.is_decode() {
        GatewayError::internal(format!("{label}: unexpected response: {err}"))
    } else {
        GatewayError::unavailable(format!("{label}: {err}"))
    }
}

/// Read the body of a failed response for the error message.
pub(crate) async fn error_for(label: &str, response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    status_error(label, status, &body)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
