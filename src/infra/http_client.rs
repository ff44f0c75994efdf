//! HTTP client factory with consistent timeout configuration.
//!
//! Outbound clients are built here rather than with `reqwest::Client::new()`
//! so that no provider call can hang a worker indefinitely.

use std::time::Duration;

use reqwest::Client;

use super::error::InfraError;

/// Connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds a client whose every request is bounded by `request_timeout`.
pub fn build_client(request_timeout: Duration) -> Result<Client, InfraError> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .build()
        .map_err(InfraError::HttpClient)
}
