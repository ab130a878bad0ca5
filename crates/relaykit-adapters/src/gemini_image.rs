//! Gemini image generation plugin.
//!
//! One `generateContent` call per invocation.  Input images travel inline as
//! base64 parts; generated images come back the same way and are emitted as
//! the `images` variable.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use relaykit_core::http::decode_json;
use relaykit_core::{
    CredentialMap, CredentialValidationError, CredentialValidator, HttpClient, HttpSettings,
    Params, Plugin, RequestHandler, Result, ToolDefinition, ToolError, ToolMessage,
};

/// Default Generative Language API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";

const TIMEOUT_SECS: u64 = 120;

const PLUGIN_ID: &str = "gemini_image";

/// Input images beyond this count draw a warning.
const MAX_INPUT_IMAGES: usize = 3;

/// An image attached to the prompt.
#[derive(Debug, Clone, PartialEq)]
struct InputImage {
    mime_type: String,
    data: String,
}

impl InputImage {
    fn from_value(tool: &str, value: &Value) -> Result<Self> {
        let data = value["data"]
            .as_str()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| ToolError::invalid(tool, "Each image needs base64 `data`"))?;
        STANDARD
            .decode(data.trim())
            .map_err(|e| ToolError::invalid(tool, format!("Image data is not valid base64: {e}")))?;
        Ok(Self {
            mime_type: value["mime_type"]
                .as_str()
                .unwrap_or("image/png")
                .to_string(),
            data: data.trim().to_string(),
        })
    }
}

/// Texts and images pulled out of a `generateContent` answer.
#[derive(Debug, Default, PartialEq)]
struct Generated {
    texts: Vec<String>,
    images: Vec<Value>,
}

fn collect_parts(response: &Value) -> Generated {
    let mut out = Generated::default();
    let candidates = response["candidates"].as_array().into_iter().flatten();
    for candidate in candidates {
        let parts = candidate["content"]["parts"].as_array().into_iter().flatten();
        for part in parts {
            if let Some(text) = part["text"].as_str()
                && !text.is_empty()
            {
                out.texts.push(text.to_string());
            }
            let inline = part.get("inlineData").or_else(|| part.get("inline_data"));
            if let Some(data) = inline.and_then(|i| i["data"].as_str()) {
                out.images.push(json!({
                    "filename": format!("output{}.png", out.images.len()),
                    "mime_type": "image/png",
                    "data": data,
                }));
            }
        }
    }
    out
}

/// Application error reported in the body, if any.
fn error_message(response: &Value) -> Option<String> {
    let error = response.get("error")?;
    Some(
        error["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

/// Gemini image plugin.
pub struct GeminiImagePlugin {
    http: HttpClient,
    base_url: String,
}

impl GeminiImagePlugin {
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

    async fn tool_image_generate(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let Some(prompt) = p.optional_str("prompt") else {
            return Ok(vec![ToolMessage::text("Please input prompt")]);
        };
        let model = p
            .optional_str("model")
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let images = match p.json_value(tool, "images")? {
            None => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(single) => vec![single],
        };
        let images = images
            .iter()
            .map(|v| InputImage::from_value(tool, v))
            .collect::<Result<Vec<_>>>()?;
        let api_key = credentials.require("gemini_api_key")?;

        let mut messages = Vec::new();
        if images.len() > MAX_INPUT_IMAGES {
            messages.push(ToolMessage::text(
                "Warning: The number of input images should be three or less.",
            ));
        }

        let mut parts = vec![json!({"text": prompt})];
        parts.extend(images.iter().map(|img| {
            json!({"inline_data": {"mime_type": img.mime_type, "data": img.data}})
        }));
        let request = self
            .http
            .client()
            .post(format!("{}/models/{model}:generateContent", self.base_url))
            .header("x-goog-api-key", api_key)
            .json(&json!({"contents": [{"parts": parts}]}));

        let response = match self.http.send_json(tool, request).await {
            Ok(body) => body,
            Err(ToolError::Upstream { status, body, .. }) => {
                let reason = decode_json(tool, &body)
                    .ok()
                    .as_ref()
                    .and_then(error_message)
                    .unwrap_or_else(|| format!("HTTP {status}: {body}"));
                return Err(ToolError::service(tool, reason));
            }
            Err(e) => return Err(e),
        };
        if let Some(reason) = error_message(&response) {
            return Err(ToolError::service(tool, reason));
        }

        let generated = collect_parts(&response);
        messages.extend(generated.texts.into_iter().map(ToolMessage::text));
        messages.push(ToolMessage::variable(
            "images",
            Value::Array(generated.images),
        ));
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

fn build_tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: "image_generate".into(),
        description: "Generate or edit images with a Gemini image model".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string", "description": "What to draw or change"},
                "model": {
                    "type": "string",
                    "description": "Model name (default: gemini-2.5-flash-image-preview)"
                },
                "images": {
                    "type": "array",
                    "description": "Input images as {mime_type, data} with base64 data",
                    "items": {
                        "type": "object",
                        "properties": {
                            "mime_type": {"type": "string"},
                            "data": {"type": "string"}
                        }
                    }
                }
            },
            "required": ["prompt"]
        }),
    }]
}

// ---------------------------------------------------------------------------
// Plugin trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialValidator for GeminiImagePlugin {
    async fn validate(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError> {
        credentials.require("gemini_api_key").map(|_| ())
    }
}

#[async_trait]
impl RequestHandler for GeminiImagePlugin {
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
            "image_generate" => self.tool_image_generate(tool, params, credentials).await,
            _ => Err(ToolError::UnknownTool {
                plugin_id: PLUGIN_ID.into(),
                tool_name: tool.to_string(),
            }),
        }
    }
}

impl Plugin for GeminiImagePlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "Gemini image generation"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
