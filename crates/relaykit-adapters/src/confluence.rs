//! Confluence plugin using the REST API with a personal access token.
//!
//! The `Authorization` header is `<token_type> <token>`, so both bearer
//! tokens (Data Center) and `Basic` credentials (Cloud) work.

use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use crate::html::strip_html;
use relaykit_core::{
    CredentialMap, CredentialValidationError, CredentialValidator, HttpClient, HttpSettings,
    Params, Plugin, RequestHandler, Result, ToolDefinition, ToolError, ToolMessage,
};

const TIMEOUT_SECS: u64 = 30;

const PLUGIN_ID: &str = "confluence";

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

const DEFAULT_SEARCH_LIMIT: i64 = 10;

/// Search results are capped at this many per call.
const MAX_SEARCH_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Typed Confluence credentials.
pub struct ConfluenceCredentials {
    /// Site root, always ending in `/`.
    pub url: Url,
    authorization: String,
}

impl ConfluenceCredentials {
    pub fn from_map(
        credentials: &CredentialMap,
    ) -> std::result::Result<Self, CredentialValidationError> {
        let raw = credentials.require("url")?;
        let url = Url::parse(&format!("{}/", raw.trim_end_matches('/'))).map_err(|e| {
            CredentialValidationError::Invalid {
                key: "url".into(),
                reason: e.to_string(),
            }
        })?;
        let token = credentials.require("token")?;
        let token_type = credentials.get("token_type").unwrap_or(DEFAULT_TOKEN_TYPE);
        Ok(Self {
            url,
            authorization: format!("{token_type} {token}"),
        })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, url::ParseError> {
        self.url.join(path)
    }

    /// `rest/api/content/<id>`, with the id pushed as one encoded segment.
    fn content_endpoint(&self, page_id: &str) -> std::result::Result<Url, url::ParseError> {
        let mut url = self.endpoint("rest/api/content")?;
        if let Ok(mut path) = url.path_segments_mut() {
            path.push(page_id);
        }
        Ok(url)
    }
}

fn bad_endpoint(tool: &str, e: url::ParseError) -> ToolError {
    ToolError::Transport {
        tool_name: tool.to_string(),
        reason: format!("invalid endpoint URL: {e}"),
    }
}

impl std::fmt::Debug for ConfluenceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceCredentials")
            .field("url", &self.url.as_str())
            .field("authorization", &"<redacted>")
            .finish()
    }
}

/// Compact view of a content item.
fn page_summary(page: &Value) -> Value {
    let html = page["body"]["storage"]["value"].as_str().unwrap_or_default();
    json!({
        "id": page["id"],
        "type": page["type"],
        "title": page["title"].as_str().unwrap_or_default(),
        "status": page["status"].as_str().unwrap_or("current"),
        "version": page["version"]["number"].as_i64().unwrap_or(1),
        "space": page["space"]["key"],
        "content": strip_html(html),
    })
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// Confluence plugin.
pub struct ConfluencePlugin {
    http: HttpClient,
}

impl ConfluencePlugin {
    pub fn new(settings: &HttpSettings) -> Self {
        Self {
            http: settings.client(TIMEOUT_SECS),
        }
    }

    fn get(&self, creds: &ConfluenceCredentials, url: Url) -> reqwest::RequestBuilder {
        self.http
            .client()
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::AUTHORIZATION, &creds.authorization)
    }

    // -----------------------------------------------------------------------
    // Tool implementations
    // -----------------------------------------------------------------------

    async fn tool_get_page(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let page_id = p.required_str(tool, "page_id")?;
        let creds = ConfluenceCredentials::from_map(credentials)?;
        let url = creds
            .content_endpoint(&page_id)
            .map_err(|e| bad_endpoint(tool, e))?;
        let request = self
            .get(&creds, url)
            .query(&[("expand", "body.storage,version")]);

        let page = match self.http.send_json(tool, request).await {
            Ok(page) => page,
            Err(ToolError::Upstream { status: 404, .. }) => {
                return Err(ToolError::service(
                    tool,
                    format!("Page with ID '{page_id}' not found"),
                ));
            }
            Err(ToolError::Upstream { status: 401, .. }) => {
                return Err(ToolError::service(
                    tool,
                    "Authentication failed. Please check the token.",
                ));
            }
            Err(e) => return Err(e),
        };

        let summary = page_summary(&page);
        Ok(vec![
            ToolMessage::json(summary.clone()),
            ToolMessage::variable("content", summary["content"].clone()),
            ToolMessage::variable("title", summary["title"].clone()),
        ])
    }

    async fn tool_search(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let cql = p.required_str(tool, "cql")?;
        let limit = p
            .i64_or("limit", DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        let creds = ConfluenceCredentials::from_map(credentials)?;
        let url = creds
            .endpoint("rest/api/content/search")
            .map_err(|e| bad_endpoint(tool, e))?;
        let request = self
            .get(&creds, url)
            .query(&[("cql", cql), ("limit", limit.to_string())]);

        let response = self.http.send_json(tool, request).await?;
        let results: Vec<Value> = response["results"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        json!({
                            "id": item["id"],
                            "type": item["type"],
                            "title": item["title"],
                            "link": item["_links"]["webui"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(vec![ToolMessage::json(json!({
            "size": results.len(),
            "total": response.get("totalSize").cloned().unwrap_or(Value::Null),
            "results": results,
        }))])
    }
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

fn build_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_page".into(),
            description: "Get a Confluence page with its body as plain text".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "page_id": {"type": "string", "description": "Content id"}
                },
                "required": ["page_id"]
            }),
        },
        ToolDefinition {
            name: "search".into(),
            description: "Search Confluence content with CQL".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "cql": {
                        "type": "string",
                        "description": "CQL query, e.g. type=page AND text~\"release\""
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum results, 1-100 (default: 10)"
                    }
                },
                "required": ["cql"]
            }),
        },
    ]
}

// ---------------------------------------------------------------------------
// Plugin trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialValidator for ConfluencePlugin {
    async fn validate(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError> {
        let creds = ConfluenceCredentials::from_map(credentials)?;
        let url = creds
            .endpoint("rest/api/space")
            .map_err(|e| CredentialValidationError::Invalid {
                key: "url".into(),
                reason: e.to_string(),
            })?;
        let request = self
            .http
            .client()
            .get(url)
            .query(&[("limit", "1")])
            .header(reqwest::header::AUTHORIZATION, &creds.authorization);
        self.http.probe(PLUGIN_ID, request).await.map(|_| ())
    }
}

#[async_trait]
impl RequestHandler for ConfluencePlugin {
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
            "get_page" => self.tool_get_page(tool, params, credentials).await,
            "search" => self.tool_search(tool, params, credentials).await,
            _ => Err(ToolError::UnknownTool {
                plugin_id: PLUGIN_ID.into(),
                tool_name: tool.to_string(),
            }),
        }
    }
}

impl Plugin for ConfluencePlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "Confluence pages and CQL search"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> CredentialMap {
        CredentialMap::new()
            .with("url", "https://wiki.example.test/confluence")
            .with("token", "secret-token")
    }

    #[test]
    fn authorization_defaults_to_bearer() {
        let creds = ConfluenceCredentials::from_map(&map()).unwrap();
        assert_eq!(creds.authorization, "Bearer secret-token");

        let creds = ConfluenceCredentials::from_map(&map().with("token_type", "Basic")).unwrap();
        assert_eq!(creds.authorization, "Basic secret-token");
    }

    #[test]
    fn endpoints_join_under_site_path() {
        let creds = ConfluenceCredentials::from_map(&map()).unwrap();
        assert_eq!(
            creds.endpoint("rest/api/space").unwrap().as_str(),
            "https://wiki.example.test/confluence/rest/api/space"
        );
    }

    #[test]
    fn page_id_is_one_encoded_segment() {
        let creds = ConfluenceCredentials::from_map(&map()).unwrap();
        assert_eq!(
            creds.content_endpoint("12?expand=x#y").unwrap().as_str(),
            "https://wiki.example.test/confluence/rest/api/content/12%3Fexpand=x%23y"
        );
        assert_eq!(
            creds.content_endpoint("../space").unwrap().path(),
            "/confluence/rest/api/content/..%2Fspace"
        );
    }

    #[test]
    fn debug_hides_token() {
        let creds = ConfluenceCredentials::from_map(&map()).unwrap();
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn page_summary_strips_storage_html() {
        let page = json!({
            "id": "42",
            "type": "page",
            "title": "Runbook",
            "version": {"number": 3},
            "space": {"key": "OPS"},
            "body": {"storage": {"value": "<p>Restart <b>both</b> nodes</p>"}}
        });
        let summary = page_summary(&page);
        assert_eq!(summary["content"], "Restart both nodes");
        assert_eq!(summary["version"], 3);
        assert_eq!(summary["status"], "current");
        assert_eq!(summary["space"], "OPS");
    }

    #[tokio::test]
    async fn validate_requires_token() {
        let plugin = ConfluencePlugin::new(&HttpSettings::default());
        let creds = CredentialMap::new().with("url", "https://wiki.example.test");
        let err = plugin.validate(&creds).await.unwrap_err();
        assert!(matches!(err, CredentialValidationError::Missing { key } if key == "token"));
    }
}
