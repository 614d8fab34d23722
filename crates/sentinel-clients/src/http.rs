//! Shared reqwest plumbing

use sentinel_core::{Result, SentinelError};
use std::time::Duration;

/// Build a client with a whole-request timeout
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("sentinel/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SentinelError::Internal(format!("HTTP client: {e}")))
}

/// Map a transport failure onto the error taxonomy
pub(crate) fn map_send_error(err: reqwest::Error, endpoint: &str, timeout: Duration) -> SentinelError {
    if err.is_timeout() {
        SentinelError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        }
    } else {
        SentinelError::ConnectionFailed {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Fail on non-success status, then decode the JSON body
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SentinelError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| SentinelError::MalformedResponse(e.to_string()))
}
