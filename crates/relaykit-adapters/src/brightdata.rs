//! Bright Data Web Unlocker plugin.
//!
//! Scrapes a single page through the `/request` endpoint and returns it as a
//! one-entry crawl result.

use async_trait::async_trait;
use serde_json::{Value, json};

use relaykit_core::{
    CredentialMap, CredentialValidationError, CredentialValidator, HttpClient, HttpSettings,
    Params, Plugin, RequestHandler, Result, ToolDefinition, ToolError, ToolMessage,
};

/// Default Bright Data API base URL.
const DEFAULT_BASE_URL: &str = "https://api.brightdata.com";

const TIMEOUT_SECS: u64 = 180;

const PLUGIN_ID: &str = "brightdata";

/// Zone used when the credentials name none.
const DEFAULT_ZONE: &str = "dify_plugin";

/// Shortest token length accepted by the format check.
const MIN_TOKEN_LEN: usize = 10;

/// Typed Bright Data credentials.
struct BrightDataCredentials<'a> {
    api_token: &'a str,
    zone: &'a str,
}

impl<'a> BrightDataCredentials<'a> {
    fn from_map(
        credentials: &'a CredentialMap,
    ) -> std::result::Result<Self, CredentialValidationError> {
        let api_token = credentials.require("api_token")?;
        if api_token.chars().count() < MIN_TOKEN_LEN {
            return Err(CredentialValidationError::Invalid {
                key: "api_token".into(),
                reason: "API token appears too short to be valid.".into(),
            });
        }
        Ok(Self {
            api_token,
            zone: credentials.get("zone").unwrap_or(DEFAULT_ZONE),
        })
    }
}

/// Bright Data plugin.
pub struct BrightDataPlugin {
    http: HttpClient,
    base_url: String,
}

impl BrightDataPlugin {
    pub fn new(settings: &HttpSettings) -> Self {
        Self {
            http: settings.client(TIMEOUT_SECS),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the plugin at a different API root (used by tests).
    pub fn with_base_url(settings: &HttpSettings, base_url: &str) -> Self {
        let mut plugin = Self::new(settings);
        plugin.base_url = base_url.trim_end_matches('/').to_string();
        plugin
    }

    // -----------------------------------------------------------------------
    // Tool implementations
    // -----------------------------------------------------------------------

    async fn tool_scrape(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let url = p
            .optional_str("url")
            .ok_or_else(|| ToolError::invalid(tool, "URL cannot be empty."))?;
        let data_format = p
            .optional_str("format")
            .unwrap_or_else(|| "markdown".to_string());
        let creds = BrightDataCredentials::from_map(credentials)?;

        let payload = json!({
            "url": url,
            "zone": creds.zone,
            "format": "raw",
            "data_format": data_format,
        });
        let request = self
            .http
            .client()
            .post(format!("{}/request", self.base_url))
            .bearer_auth(creds.api_token)
            .json(&payload);

        let content = self.http.send_text(tool, request).await?;

        Ok(vec![ToolMessage::json(crawl_result(&url, content))])
    }
}

/// One-page crawl result in the host's website-crawl shape.
fn crawl_result(url: &str, content: String) -> Value {
    json!({
        "status": "completed",
        "total": 1,
        "completed": 1,
        "web_info_list": [{
            "title": url,
            "source_url": url,
            "description": content,
            "content": content,
        }],
    })
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

fn build_tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: "scrape".into(),
        description: "Scrape a web page through Bright Data and return its content".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Page to scrape"},
                "format": {
                    "type": "string",
                    "enum": ["markdown", "html"],
                    "description": "Content format (default: markdown)"
                }
            },
            "required": ["url"]
        }),
    }]
}

// ---------------------------------------------------------------------------
// Plugin trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialValidator for BrightDataPlugin {
    async fn validate(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError> {
        BrightDataCredentials::from_map(credentials).map(|_| ())
    }
}

#[async_trait]
impl RequestHandler for BrightDataPlugin {
    fn tools(&self) -> Vec<ToolDefinition> {
        build_tool_definitions()
    }

    async fn handle(
        &self,
        tool: &str,
        params: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        match tool {
            "scrape" => self.tool_scrape(tool, params, credentials).await,
            _ => Err(ToolError::UnknownTool {
                plugin_id: PLUGIN_ID.into(),
                tool_name: tool.to_string(),
            }),
        }
    }
}

impl Plugin for BrightDataPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "Bright Data web scraping"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
