//! Provider and tool contracts.
//!
//! Every external service implements [`CredentialValidator`] (the provider
//! side) and [`RequestHandler`] (the tool side).  [`Plugin`] ties the two
//! together with an id so that the service can live in the static
//! [`crate::PluginRegistry`] table.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::credentials::CredentialMap;
use crate::error::{CredentialValidationError, Result, ToolError};
use crate::message::ToolMessage;
use crate::params::Params;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// A tool exposed by a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Machine-readable tool name (e.g. `get_record`).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    pub parameters: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Core traits
// ---------------------------------------------------------------------------

/// Provider side: decide whether a set of credentials is usable.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Check required keys and formats, then make at most one probe call.
    async fn validate(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError>;
}

/// Tool side: turn one request into an ordered list of messages.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// The tools this handler exposes.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Run one tool.  Implementations issue at most one external request.
    async fn handle(
        &self,
        tool: &str,
        params: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>>;

    /// Shape a failure as the single message the host sees.
    fn render_error(&self, error: &ToolError) -> ToolMessage {
        ToolMessage::json(json!({
            "success": false,
            "error_msg": error.detail(),
            "error_kind": error.kind(),
        }))
    }

    /// Whether `tool` is one of [`RequestHandler::tools`].
    fn has_tool(&self, tool: &str) -> bool {
        self.tools().iter().any(|t| t.name == tool)
    }
}

/// A registered service: provider plus tools.
pub trait Plugin: CredentialValidator + RequestHandler {
    /// Stable identifier used for routing and configuration.
    fn id(&self) -> &str;

    /// One-line human-readable description.
    fn description(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Invocation boundary
// ---------------------------------------------------------------------------

/// Run a tool and never fail: errors become exactly one message rendered by
/// the handler.
pub async fn invoke<H>(
    handler: &H,
    tool: &str,
    params: &Params,
    credentials: &CredentialMap,
) -> Vec<ToolMessage>
where
    H: RequestHandler + ?Sized,
{
    match handler.handle(tool, params, credentials).await {
        Ok(messages) => messages,
        Err(err) => {
            warn!(
                tool,
                kind = err.kind(),
                client_error = err.is_client_error(),
                error = %err,
                "tool invocation failed"
            );
            vec![handler.render_error(&err)]
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
