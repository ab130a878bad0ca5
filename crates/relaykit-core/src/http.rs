//! Shared HTTP plumbing.
//!
//! [`HttpClient`] wraps a [`reqwest::Client`] with a fixed timeout and maps
//! every way a request can go wrong onto [`ToolError`] (for tools) or
//! [`CredentialValidationError`] (for provider probes).  No retries.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use crate::error::{CredentialValidationError, Result, ToolError};

/// Upper bound on how much of an error body is kept.
pub const MAX_ERROR_BODY: usize = 4096;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("relaykit/", env!("CARGO_PKG_VERSION"));

/// A `reqwest` client bound to one timeout.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    timeout_secs: u64,
}

impl HttpClient {
    /// Build a client with the given timeout and user agent.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Self {
        let inner = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            inner,
            timeout_secs,
        }
    }

    /// The underlying client, for building requests.
    pub fn client(&self) -> &reqwest::Client {
        &self.inner
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    // -----------------------------------------------------------------------
    // Tool requests
    // -----------------------------------------------------------------------

    /// Send a request and require a success status.
    pub async fn send(&self, tool_name: &str, request: RequestBuilder) -> Result<Response> {
        let request = request.build().map_err(|e| ToolError::Transport {
            tool_name: tool_name.to_string(),
            reason: format!("failed to build request: {e}"),
        })?;
        debug!(
            tool = tool_name,
            method = %request.method(),
            url = %request.url(),
            "sending request"
        );

        let response = self
            .inner
            .execute(request)
            .await
            .map_err(|e| self.map_send_error(tool_name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Upstream {
                tool_name: tool_name.to_string(),
                status: status.as_u16(),
                body: snippet(&body, MAX_ERROR_BODY).to_string(),
            });
        }
        Ok(response)
    }

    /// Send a request and decode the body as JSON.
    pub async fn send_json(&self, tool_name: &str, request: RequestBuilder) -> Result<Value> {
        let body = self.send_text(tool_name, request).await?;
        decode_json(tool_name, &body)
    }

    /// Send a request and return the body as text.
    pub async fn send_text(&self, tool_name: &str, request: RequestBuilder) -> Result<String> {
        let response = self.send(tool_name, request).await?;
        response.text().await.map_err(|e| ToolError::Transport {
            tool_name: tool_name.to_string(),
            reason: format!("failed to read response body: {e}"),
        })
    }

    fn map_send_error(&self, tool_name: &str, e: reqwest::Error) -> ToolError {
        if e.is_timeout() {
            ToolError::Timeout {
                tool_name: tool_name.to_string(),
                seconds: self.timeout_secs,
            }
        } else {
            ToolError::Transport {
                tool_name: tool_name.to_string(),
                reason: format!("Network request failed: {e}"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Provider probes
    // -----------------------------------------------------------------------

    /// Send a credential probe.  Connection failures become
    /// [`CredentialValidationError::Unreachable`], non-success statuses
    /// become [`CredentialValidationError::Rejected`].
    pub async fn probe(
        &self,
        provider: &str,
        request: RequestBuilder,
    ) -> std::result::Result<Response, CredentialValidationError> {
        let response = request
            .send()
            .await
            .map_err(|e| CredentialValidationError::Unreachable {
                provider: provider.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialValidationError::Rejected {
                provider: provider.to_string(),
                reason: format!("HTTP {}: {}", status.as_u16(), snippet(&body, MAX_ERROR_BODY)),
            });
        }
        Ok(response)
    }

    /// [`HttpClient::probe`] followed by JSON decoding.
    pub async fn probe_json(
        &self,
        provider: &str,
        request: RequestBuilder,
    ) -> std::result::Result<Value, CredentialValidationError> {
        let response = self.probe(provider, request).await?;
        response
            .json()
            .await
            .map_err(|e| CredentialValidationError::Rejected {
                provider: provider.to_string(),
                reason: format!("unexpected probe response: {e}"),
            })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(30, DEFAULT_USER_AGENT)
    }
}

/// Parse a body as JSON, keeping a short snippet of the body on failure.
pub fn decode_json(tool_name: &str, body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|_| ToolError::Decode {
        tool_name: tool_name.to_string(),
        reason: format!("Failed to parse response JSON: {}", snippet(body, 200)),
    })
}

/// Longest prefix of `text` no longer than `max` bytes, cut on a char
/// boundary.
pub fn snippet(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
