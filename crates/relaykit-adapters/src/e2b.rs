//! E2B sandbox plugin.
//!
//! Talks to the E2B control-plane REST API only; nothing here creates or
//! drives a sandbox.

use async_trait::async_trait;
use serde_json::{Value, json};

use relaykit_core::{
    CredentialMap, CredentialValidationError, CredentialValidator, HttpClient, HttpSettings,
    Params, Plugin, RequestHandler, Result, ToolDefinition, ToolError, ToolMessage,
};

const DEFAULT_DOMAIN: &str = "e2b.app";

const TIMEOUT_SECS: u64 = 30;

const PLUGIN_ID: &str = "e2b";

/// E2B plugin.
pub struct E2bPlugin {
    http: HttpClient,
    /// Fixed API root; when unset it is derived from the `domain` credential.
    api_root: Option<String>,
}

impl E2bPlugin {
    pub fn new(settings: &HttpSettings) -> Self {
        Self {
            http: settings.client(TIMEOUT_SECS),
            api_root: None,
        }
    }

    /// Point the plugin at a fixed API root (used by tests).
    pub fn with_base_url(settings: &HttpSettings, base_url: &str) -> Self {
        Self {
            api_root: Some(base_url.trim_end_matches('/').to_string()),
            ..Self::new(settings)
        }
    }

    fn api_root(&self, credentials: &CredentialMap) -> String {
        match &self.api_root {
            Some(root) => root.clone(),
            None => {
                let domain = credentials.get("domain").unwrap_or(DEFAULT_DOMAIN);
                format!("https://api.{domain}")
            }
        }
    }

    fn sandboxes_request(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<reqwest::RequestBuilder, CredentialValidationError> {
        let api_key = credentials.require("api_key")?;
        Ok(self
            .http
            .client()
            .get(format!("{}/sandboxes", self.api_root(credentials)))
            .header("X-API-Key", api_key))
    }

    // -----------------------------------------------------------------------
    // Tool implementations
    // -----------------------------------------------------------------------

    async fn tool_list_sandboxes(
        &self,
        tool: &str,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let request = self.sandboxes_request(credentials)?;
        let sandboxes = self.http.send_json(tool, request).await?;
        let count = sandboxes.as_array().map_or(0, Vec::len);
        Ok(vec![ToolMessage::json(json!({
            "count": count,
            "sandboxes": match sandboxes {
                Value::Null => json!([]),
                other => other,
            },
        }))])
    }
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

fn build_tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: "list_sandboxes".into(),
        description: "List the running E2B sandboxes of this account".into(),
        parameters: json!({"type": "object", "properties": {}, "required": []}),
    }]
}

// ---------------------------------------------------------------------------
// Plugin trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialValidator for E2bPlugin {
    async fn validate(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError> {
        let request = self.sandboxes_request(credentials)?;
        self.http.probe(PLUGIN_ID, request).await.map(|_| ())
    }
}

#[async_trait]
impl RequestHandler for E2bPlugin {
    fn tools(&self) -> Vec<ToolDefinition> {
        build_tool_definitions()
    }

    async fn handle(
        &self,
        tool: &str,
        _params: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        match tool {
            "list_sandboxes" => self.tool_list_sandboxes(tool, credentials).await,
            _ => Err(ToolError::UnknownTool {
                plugin_id: PLUGIN_ID.into(),
                tool_name: tool.to_string(),
            }),
        }
    }
}

impl Plugin for E2bPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "E2B sandbox listing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_root_follows_domain() {
        let plugin = E2bPlugin::new(&HttpSettings::default());
        assert_eq!(plugin.api_root(&CredentialMap::new()), "https://api.e2b.app");
        assert_eq!(
            plugin.api_root(&CredentialMap::new().with("domain", "e2b.example")),
            "https://api.e2b.example"
        );
    }

    #[tokio::test]
    async fn validate_requires_api_key() {
        let plugin = E2bPlugin::with_base_url(&HttpSettings::default(), "http://127.0.0.1:1");
        let err = plugin.validate(&CredentialMap::new()).await.unwrap_err();
        assert!(matches!(err, CredentialValidationError::Missing { key } if key == "api_key"));
    }
}
