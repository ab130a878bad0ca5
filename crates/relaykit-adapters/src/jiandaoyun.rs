//! Jiandaoyun form platform plugin.
//!
//! Every endpoint of the v5 API is a `POST` with a JSON body and a bearer
//! token.  Tools answer with a single text message holding either JSON or a
//! Markdown table, selected by the `output_type` parameter.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use url::Url;

use relaykit_core::{
    CredentialMap, CredentialValidationError, CredentialValidator, HttpClient, HttpSettings,
    Params, Plugin, RequestHandler, Result, ToolDefinition, ToolError, ToolMessage, json_to_table,
};

/// Default Jiandaoyun API base URL.
const DEFAULT_BASE_URL: &str = "https://api.jiandaoyun.com/";

const TIMEOUT_SECS: u64 = 10;

const PLUGIN_ID: &str = "jiandaoyun";

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Typed Jiandaoyun credentials.
pub struct JiandaoyunCredentials {
    pub api_key: String,
    /// Base URL, always ending in `/` so that endpoints join underneath it.
    pub base_url: Url,
}

impl JiandaoyunCredentials {
    pub fn from_map(
        credentials: &CredentialMap,
    ) -> std::result::Result<Self, CredentialValidationError> {
        let api_key = credentials.require("jiandaoyun_api_key")?.to_string();
        let raw = credentials.get("base_url").unwrap_or(DEFAULT_BASE_URL);
        let base_url = Url::parse(&format!("{}/", raw.trim_end_matches('/'))).map_err(|e| {
            CredentialValidationError::Invalid {
                key: "base_url".into(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { api_key, base_url })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }
}

impl std::fmt::Debug for JiandaoyunCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiandaoyunCredentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Output selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputType {
    Json,
    Table,
}

impl OutputType {
    fn from_params(tool: &str, p: &Params) -> Result<Self> {
        match p.optional_str("output_type").as_deref() {
            None | Some("json") => Ok(Self::Json),
            Some("table") => Ok(Self::Table),
            Some(other) => Err(ToolError::invalid(
                tool,
                format!("Unsupported output_type: {other} (supported types: \"json\", \"table\")"),
            )),
        }
    }
}

/// Render `rows` under `key` of `value` as a table; a lone object becomes a
/// one-row table.
fn table_of(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::Array(rows)) => json_to_table(rows),
        Some(obj @ Value::Object(_)) => json_to_table(std::slice::from_ref(obj)),
        _ => json_to_table(&[]),
    }
}

fn wrapped(data: Value, message: &str) -> String {
    json!({
        "status": "success",
        "data": data,
        "message": message,
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// Jiandaoyun plugin.
pub struct JiandaoyunPlugin {
    http: HttpClient,
}

impl JiandaoyunPlugin {
    pub fn new(settings: &HttpSettings) -> Self {
        Self {
            http: settings.client(TIMEOUT_SECS),
        }
    }

    /// POST `body` to `path` and decode the JSON answer.
    async fn post(
        &self,
        tool: &str,
        credentials: &CredentialMap,
        path: &str,
        body: Value,
    ) -> Result<Value> {
        let creds = JiandaoyunCredentials::from_map(credentials)?;
        let url = creds.endpoint(path).map_err(|e| ToolError::Transport {
            tool_name: tool.to_string(),
            reason: format!("invalid endpoint URL: {e}"),
        })?;
        let request = self
            .http
            .client()
            .post(url)
            .bearer_auth(&creds.api_key)
            .json(&body);
        self.http.send_json(tool, request).await
    }

    // -----------------------------------------------------------------------
    // Tool implementations
    // -----------------------------------------------------------------------

    async fn tool_get_apps(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<String> {
        let output = OutputType::from_params(tool, p)?;
        let body = json!({
            "limit": p.i64_or("limit", 10),
            "skip": p.i64_or("offset", 0),
        });
        let response = self.post(tool, credentials, "v5/app/list", body).await?;
        Ok(match output {
            OutputType::Json => serde_json::to_string_pretty(&response).unwrap_or_default(),
            OutputType::Table => table_of(&response, "apps"),
        })
    }

    async fn tool_get_entries(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<String> {
        let app_id = p.required_str(tool, "app_id")?;
        let output = OutputType::from_params(tool, p)?;
        let body = json!({
            "app_id": app_id,
            "limit": p.i64_or("limit", 100),
            "offset": p.i64_or("offset", 0),
        });
        let response = self.post(tool, credentials, "v5/app/entry/list", body).await?;
        Ok(match output {
            OutputType::Json => wrapped(response, "Successfully fetched entry list"),
            OutputType::Table => table_of(&response, "forms"),
        })
    }

    async fn tool_get_widgets(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<String> {
        let app_id = p.required_str(tool, "app_id")?;
        let entry_id = p.required_str(tool, "entry_id")?;
        let output = OutputType::from_params(tool, p)?;
        let body = json!({"app_id": app_id, "entry_id": entry_id});
        let response = self
            .post(tool, credentials, "v5/app/entry/widget/list", body)
            .await?;
        Ok(match output {
            OutputType::Json => response.to_string(),
            OutputType::Table => table_of(&response, "widgets"),
        })
    }

    async fn tool_get_record(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<String> {
        let app_id = p.required_str(tool, "app_id")?;
        let entry_id = p.required_str(tool, "entry_id")?;
        let data_id = p.required_str(tool, "data_id")?;
        let output = OutputType::from_params(tool, p)?;
        let body = json!({"app_id": app_id, "entry_id": entry_id, "data_id": data_id});
        let response = self
            .post(tool, credentials, "v5/app/entry/data/get", body)
            .await?;
        Ok(match output {
            OutputType::Json => response.to_string(),
            OutputType::Table => table_of(&response, "data"),
        })
    }

    async fn tool_get_records(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<String> {
        let app_id = p.required_str(tool, "app_id")?;
        let entry_id = p.required_str(tool, "entry_id")?;
        let output = OutputType::from_params(tool, p)?;

        let mut body = Map::new();
        body.insert("app_id".into(), app_id.into());
        body.insert("entry_id".into(), entry_id.into());
        if let Some(data_id) = p.optional_str("data_id") {
            body.insert("data_id".into(), data_id.into());
        }
        if let Some(fields) = p.json_value(tool, "fields")? {
            body.insert("fields".into(), fields);
        }
        if let Some(filter) = p.json_value(tool, "filter")? {
            body.insert("filter".into(), filter);
        }
        body.insert("limit".into(), p.i64_or("limit", 10).into());

        let response = self
            .post(tool, credentials, "v5/app/entry/data/list", Value::Object(body))
            .await?;
        Ok(match output {
            OutputType::Json => wrapped(response, "Successfully fetched data list"),
            OutputType::Table => table_of(&response, "data"),
        })
    }

    async fn tool_create_records(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<String> {
        let app_id = p.required_str(tool, "app_id")?;
        let entry_id = p.required_str(tool, "entry_id")?;
        let data_list = p.required_array(tool, "data_list")?;
        let body = json!({"app_id": app_id, "entry_id": entry_id, "data_list": data_list});
        let response = self
            .post(tool, credentials, "v5/app/entry/data/create", body)
            .await?;
        Ok(wrapped(response, "Data created successfully"))
    }

    async fn tool_update_record(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<String> {
        let app_id = p.required_str(tool, "app_id")?;
        let entry_id = p.required_str(tool, "entry_id")?;
        let data_id = p.required_str(tool, "data_id")?;
        let data = p
            .json_object(tool, "data")?
            .ok_or_else(|| ToolError::invalid(tool, "Missing parameter: data"))?;
        let body = json!({
            "app_id": app_id,
            "entry_id": entry_id,
            "data_id": data_id,
            "data": data,
        });
        let response = self
            .post(tool, credentials, "v5/app/entry/data/update", body)
            .await?;
        Ok(wrapped(response, "Data updated successfully"))
    }

    async fn tool_delete_record(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<String> {
        let app_id = p.required_str(tool, "app_id")?;
        let entry_id = p.required_str(tool, "entry_id")?;
        let data_id = p.required_str(tool, "data_id")?;
        let body = json!({"app_id": app_id, "entry_id": entry_id, "data_id": data_id});
        let response = self
            .post(tool, credentials, "v5/app/entry/data/delete", body)
            .await?;
        Ok(wrapped(response, "Data deleted successfully"))
    }
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

fn build_tool_definitions() -> Vec<ToolDefinition> {
    let output_type = json!({
        "type": "string",
        "enum": ["json", "table"],
        "description": "Return JSON text (default) or a Markdown table"
    });

    vec![
        ToolDefinition {
            name: "get_apps".into(),
            description: "List the apps visible to the API key".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "integer", "description": "Number of apps (default: 10)"},
                    "offset": {"type": "integer", "description": "Apps to skip (default: 0)"},
                    "output_type": output_type
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "get_entries".into(),
            description: "List the forms of an app".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "app_id": {"type": "string"},
                    "limit": {"type": "integer", "description": "Number of forms (default: 100)"},
                    "offset": {"type": "integer"},
                    "output_type": output_type
                },
                "required": ["app_id"]
            }),
        },
        ToolDefinition {
            name: "get_widgets".into(),
            description: "List the fields (widgets) of a form".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "app_id": {"type": "string"},
                    "entry_id": {"type": "string"},
                    "output_type": output_type
                },
                "required": ["app_id", "entry_id"]
            }),
        },
        ToolDefinition {
            name: "get_record".into(),
            description: "Get a single form record".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "app_id": {"type": "string"},
                    "entry_id": {"type": "string"},
                    "data_id": {"type": "string"},
                    "output_type": output_type
                },
                "required": ["app_id", "entry_id", "data_id"]
            }),
        },
        ToolDefinition {
            name: "get_records".into(),
            description: "List form records with an optional filter".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "app_id": {"type": "string"},
                    "entry_id": {"type": "string"},
                    "data_id": {"type": "string", "description": "Return records after this one"},
                    "fields": {"type": "string", "description": "JSON array of field names"},
                    "filter": {"type": "string", "description": "Filter object as JSON"},
                    "limit": {"type": "integer", "description": "Number of records (default: 10)"},
                    "output_type": output_type
                },
                "required": ["app_id", "entry_id"]
            }),
        },
        ToolDefinition {
            name: "create_records".into(),
            description: "Create form records".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "app_id": {"type": "string"},
                    "entry_id": {"type": "string"},
                    "data_list": {"type": "string", "description": "JSON array of records"}
                },
                "required": ["app_id", "entry_id", "data_list"]
            }),
        },
        ToolDefinition {
            name: "update_record".into(),
            description: "Update a form record".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "app_id": {"type": "string"},
                    "entry_id": {"type": "string"},
                    "data_id": {"type": "string"},
                    "data": {"type": "string", "description": "JSON object of field values"}
                },
                "required": ["app_id", "entry_id", "data_id", "data"]
            }),
        },
        ToolDefinition {
            name: "delete_record".into(),
            description: "Delete a form record".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "app_id": {"type": "string"},
                    "entry_id": {"type": "string"},
                    "data_id": {"type": "string"}
                },
                "required": ["app_id", "entry_id", "data_id"]
            }),
        },
    ]
}

// ---------------------------------------------------------------------------
// Plugin trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialValidator for JiandaoyunPlugin {
    async fn validate(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError> {
        JiandaoyunCredentials::from_map(credentials).map(|_| ())
    }
}

#[async_trait]
impl RequestHandler for JiandaoyunPlugin {
    fn tools(&self) -> Vec<ToolDefinition> {
        build_tool_definitions()
    }

    async fn handle(
        &self,
        tool: &str,
        params: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let text = match tool {
            "get_apps" => self.tool_get_apps(tool, params, credentials).await?,
            "get_entries" => self.tool_get_entries(tool, params, credentials).await?,
            "get_widgets" => self.tool_get_widgets(tool, params, credentials).await?,
            "get_record" => self.tool_get_record(tool, params, credentials).await?,
            "get_records" => self.tool_get_records(tool, params, credentials).await?,
            "create_records" => self.tool_create_records(tool, params, credentials).await?,
            "update_record" => self.tool_update_record(tool, params, credentials).await?,
            "delete_record" => self.tool_delete_record(tool, params, credentials).await?,
            _ => {
                return Err(ToolError::UnknownTool {
                    plugin_id: PLUGIN_ID.into(),
                    tool_name: tool.to_string(),
                });
            }
        };
        Ok(vec![ToolMessage::text(text)])
    }
}

impl Plugin for JiandaoyunPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "Jiandaoyun apps, forms and records"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
