//! Shared HTTP plumbing for adapters
//!
//! One pooled [`reqwest::Client`] is built at startup and cloned into every
//! adapter. Upstream statuses and transport errors are mapped onto
//! [`FailureKind`](crate::error::FailureKind) here so every adapter reports
//! them the same way.

use crate::error::{Error, Result, ToolFailure};
use aiops_llm::util::sanitize_upstream_error;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// User agent sent to every upstream
pub const USER_AGENT: &str = concat!("aiops-assistant/", env!("CARGO_PKG_VERSION"));

/// Build the shared client
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::Http(e.to_string()))
}

/// Map a non-success status to a typed failure
#[must_use]
pub fn map_status(provider: &str, status: StatusCode, body: &str) -> ToolFailure {
    let detail = format!(
        "{} returned {}: {}",
        provider,
        status.as_u16(),
        sanitize_upstream_error(body)
    );
    match status {
        StatusCode::NOT_FOUND => ToolFailure::not_found(detail),
        StatusCode::TOO_MANY_REQUESTS => ToolFailure::rate_limited(detail),
        s if s.is_server_error() => ToolFailure::unavailable(detail),
        _ => ToolFailure::malformed(detail),
    }
}

/// Map a transport error to a typed failure
#[must_use]
pub fn map_transport(provider: &str, e: &reqwest::Error) -> ToolFailure {
    ToolFailure::unavailable(format!(
        "{} unreachable: {}",
        provider,
        sanitize_upstream_error(&e.to_string())
    ))
}

/// Read the body of a response, mapping non-success statuses
pub async fn read_body(
    provider: &str,
    response: Response,
) -> std::result::Result<String, ToolFailure> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| map_transport(provider, &e))?;
    if !status.is_success() {
        return Err(map_status(provider, status, &body));
    }
    Ok(body)
}

/// Send a request and return the body of a successful response
pub async fn fetch_text(
    provider: &str,
    request: RequestBuilder,
) -> std::result::Result<String, ToolFailure> {
    let response = request.send().await.map_err(|e| map_transport(provider, &e))?;
    read_body(provider, response).await
}

/// Send a request and parse a successful response as JSON
pub async fn fetch_json(
    provider: &str,
    request: RequestBuilder,
) -> std::result::Result<Value, ToolFailure> {
    let body = fetch_text(provider, request).await?;
    serde_json::from_str(&body).map_err(|e| {
        ToolFailure::malformed(format!(
            "{} returned a body that is not JSON ({}): {}",
            provider,
            e,
            aiops_llm::util::snippet(&body, 120)
        ))
    })
}
