//! Error types for RelayKit.
//!
//! Two tiers: [`CredentialValidationError`] is raised by providers and
//! blocks tool usage entirely, while [`ToolError`] is produced inside a tool
//! and is converted into an output message at the invocation boundary.
//! [`RegistryError`] covers routing mistakes (unknown plugin or tool) and
//! [`ConfigError`] covers loading `relaykit.toml`.

use std::path::PathBuf;

/// Why a provider refused a set of credentials.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialValidationError {
    /// A required key is absent or blank.
    #[error("missing required credential `{key}`")]
    Missing { key: String },

    /// A key is present but fails a format check.
    #[error("invalid credential `{key}`: {reason}")]
    Invalid { key: String, reason: String },

    /// The live probe reached the service and it said no.
    #[error("credentials rejected by {provider}: {reason}")]
    Rejected { provider: String, reason: String },

    /// The live probe could not reach the service at all.
    #[error("failed to reach {provider}: {reason}")]
    Unreachable { provider: String, reason: String },
}

/// Failure of a single tool invocation.
///
/// Client-side failures (bad parameters, bad credentials, unknown tool) are
/// kept apart from server-side ones (transport, timeout, upstream status,
/// undecodable body) so that callers can tell "fix your input" from "the
/// service is down".
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The parameters supplied to a tool are invalid.
    #[error("invalid parameters for tool `{tool_name}`: {reason}")]
    InvalidParams { tool_name: String, reason: String },

    /// Credentials could not be turned into a typed configuration.
    #[error(transparent)]
    Credentials(#[from] CredentialValidationError),

    /// The request never produced a response.
    #[error("request failed for tool `{tool_name}`: {reason}")]
    Transport { tool_name: String, reason: String },

    /// The request exceeded the fixed client timeout.
    #[error("request for tool `{tool_name}` timed out after {seconds}s")]
    Timeout { tool_name: String, seconds: u64 },

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Upstream {
        tool_name: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response for tool `{tool_name}`: {reason}")]
    Decode { tool_name: String, reason: String },

    /// The service answered successfully but reported an application error.
    #[error("{reason}")]
    Service { tool_name: String, reason: String },

    /// The plugin has no tool with this name.
    #[error("tool not found: `{tool_name}` on plugin `{plugin_id}`")]
    UnknownTool { plugin_id: String, tool_name: String },
}

impl ToolError {
    /// Shorthand for [`ToolError::InvalidParams`].
    pub fn invalid(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            tool_name: tool_name.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ToolError::Service`].
    pub fn service(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::Service {
            tool_name: tool_name.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable label for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParams { .. } => "invalid_params",
            Self::Credentials(_) => "credentials",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Upstream { .. } => "upstream",
            Self::Decode { .. } => "decode",
            Self::Service { .. } => "service",
            Self::UnknownTool { .. } => "unknown_tool",
        }
    }

    /// `true` when the caller can fix the failure by changing its input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParams { .. } | Self::Credentials(_) | Self::UnknownTool { .. }
        )
    }

    /// Human-readable detail without the tool-name prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::InvalidParams { reason, .. }
            | Self::Transport { reason, .. }
            | Self::Decode { reason, .. }
            | Self::Service { reason, .. } => reason.clone(),
            Self::Timeout { seconds, .. } => format!("request timed out after {seconds}s"),
            other => other.to_string(),
        }
    }
}

/// Routing failures inside the plugin registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No plugin is registered under this id.
    #[error("plugin not found: `{plugin_id}`")]
    PluginNotFound { plugin_id: String },

    /// The plugin exists but does not expose this tool.
    #[error("tool not found: `{tool_name}` on plugin `{plugin_id}`")]
    ToolNotFound { plugin_id: String, tool_name: String },

    /// The provider refused the credentials.
    #[error(transparent)]
    Validation(#[from] CredentialValidationError),
}

/// Failure while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::RelayConfig`].
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An override carried a value of the wrong shape.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Convenience alias for tool results.
pub type Result<T> = std::result::Result<T, ToolError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
