//! Unstructured document partitioning plugin.
//!
//! Uploads one file to the `general/v0/general` endpoint of a local or
//! hosted Unstructured API and returns the extracted elements.  Chunked
//! responses carry their source elements as base64 zlib blobs under
//! `metadata.orig_elements`; those are expanded in place.

use std::io::Read;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::ZlibDecoder;
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;

use relaykit_core::{
    CredentialMap, CredentialValidationError, CredentialValidator, HttpClient, HttpSettings,
    Params, Plugin, RequestHandler, Result, ToolDefinition, ToolError, ToolMessage,
};

const TIMEOUT_SECS: u64 = 300;

const PLUGIN_ID: &str = "unstructured";

const PARTITION_PATH: &str = "general/v0/general";

/// Options callers may pass through `advanced_options`.
const ADVANCED_OPTIONS: [&str; 20] = [
    "coordinates",
    "content_type",
    "encoding",
    "extract_image_block_types",
    "gz_uncompressed_content_type",
    "include_page_breaks",
    "ocr_languages",
    "output_format",
    "pdf_infer_table_structure",
    "skip_infer_table_types",
    "starting_page_number",
    "unique_element_ids",
    "xml_keep_tags",
    "combine_under_n_chars",
    "include_orig_elements",
    "multipage_sections",
    "new_after_n_chars",
    "overlap",
    "overlap_all",
    "similarity_threshold",
];

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerType {
    Local,
    Remote,
}

/// Typed Unstructured credentials.
pub struct UnstructuredCredentials {
    pub api_url: Url,
    pub api_key: Option<String>,
    server_type: ServerType,
}

impl UnstructuredCredentials {
    pub fn from_map(
        credentials: &CredentialMap,
    ) -> std::result::Result<Self, CredentialValidationError> {
        let raw = credentials.require("api_url")?;
        let api_url = Url::parse(raw).map_err(|e| CredentialValidationError::Invalid {
            key: "api_url".into(),
            reason: e.to_string(),
        })?;
        let server_type = match credentials.get("server_type") {
            Some("remote") => ServerType::Remote,
            _ => ServerType::Local,
        };
        let api_key = credentials.get("api_key").map(str::to_string);
        if server_type == ServerType::Remote && api_key.is_none() {
            return Err(CredentialValidationError::Missing {
                key: "api_key".into(),
            });
        }
        Ok(Self {
            api_url,
            api_key,
            server_type,
        })
    }

    /// `scheme://host[:port]/healthcheck`, ignoring any path on `api_url`.
    fn healthcheck_url(&self) -> String {
        let mut origin = format!(
            "{}://{}",
            self.api_url.scheme(),
            self.api_url.host_str().unwrap_or_default()
        );
        if let Some(port) = self.api_url.port() {
            origin.push_str(&format!(":{port}"));
        }
        format!("{origin}/healthcheck")
    }

    fn partition_url(&self) -> String {
        format!(
            "{}/{PARTITION_PATH}",
            self.api_url.as_str().trim_end_matches('/')
        )
    }

    fn key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Response shaping
// ---------------------------------------------------------------------------

/// Decode a base64 zlib blob of JSON elements.
fn expand_orig_elements(tool: &str, blob: &str) -> Result<Value> {
    let decode_err = |reason: String| ToolError::Decode {
        tool_name: tool.to_string(),
        reason,
    };
    let compressed = STANDARD
        .decode(blob)
        .map_err(|e| decode_err(format!("orig_elements is not valid base64: {e}")))?;
    let mut raw = String::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_string(&mut raw)
        .map_err(|e| decode_err(format!("orig_elements is not valid zlib data: {e}")))?;
    serde_json::from_str(&raw)
        .map_err(|e| decode_err(format!("orig_elements is not valid JSON: {e}")))
}

/// File extension for an image MIME type.
fn image_extension(mime_type: &str) -> &str {
    match mime_type {
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        _ => ".bin",
    }
}

/// Move an image element's inline data into `images`.
fn take_image(element: &mut Value, images: &mut Vec<Value>) {
    if element["type"] != "Image" {
        return;
    }
    let Some(metadata) = element.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    let Some(Value::String(data)) = metadata.remove("image_base64") else {
        return;
    };
    let mime_type = metadata
        .get("image_mime_type")
        .and_then(Value::as_str)
        .unwrap_or("image/png")
        .to_string();
    let id = element["element_id"].as_str().unwrap_or("unknown");
    images.push(json!({
        "filename": format!("image_{id}{}", image_extension(&mime_type)),
        "mime_type": mime_type,
        "data": data,
    }));
}

/// Partition output split into messages.
#[derive(Debug, Default)]
struct Partitioned {
    text: String,
    images: Vec<Value>,
    elements: Vec<Value>,
}

fn shape_elements(tool: &str, mut elements: Vec<Value>) -> Result<Partitioned> {
    let mut out = Partitioned::default();
    for element in &mut elements {
        take_image(element, &mut out.images);

        let blob = element["metadata"]["orig_elements"].as_str().map(str::to_string);
        if let Some(blob) = blob {
            let mut originals = expand_orig_elements(tool, &blob)?;
            if let Some(items) = originals.as_array_mut() {
                for original in items.iter_mut() {
                    take_image(original, &mut out.images);
                }
            }
            element["metadata"]["orig_elements"] = originals;
        }

        if let Some(text) = element["text"].as_str() {
            out.text.push_str(text);
        }
    }
    out.elements = elements;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

/// Form field value for a scalar JSON value.
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Append `name` to the form, repeating it for arrays.
fn add_field(form: Form, name: &str, value: &Value) -> Form {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(field_text)
            .fold(form, |f, v| f.text(name.to_string(), v)),
        other => match field_text(other) {
            Some(v) => form.text(name.to_string(), v),
            None => form,
        },
    }
}

/// Non-file form fields for a partition request, in submission order.
fn partition_fields(tool: &str, p: &Params) -> Result<Vec<(String, Value)>> {
    let mut fields: Vec<(String, Value)> = vec![
        (
            "strategy".into(),
            json!(p.optional_str("strategy").unwrap_or_else(|| "hi_res".into())),
        ),
        (
            "vlm_model".into(),
            json!(p.optional_str("vlm_model").unwrap_or_else(|| "gpt-4o".into())),
        ),
        (
            "vlm_model_provider".into(),
            json!(
                p.optional_str("vlm_model_provider")
                    .unwrap_or_else(|| "openai".into())
            ),
        ),
        (
            "languages".into(),
            Value::Array(p.json_array(tool, "languages")?.unwrap_or_default()),
        ),
    ];
    if let Some(chunking) = p.optional_str("chunking_strategy") {
        fields.push(("chunking_strategy".into(), json!(chunking)));
    }
    fields.push(("max_characters".into(), json!(p.i64_or("max_characters", 500))));

    let advanced: Map<String, Value> = p.json_object(tool, "advanced_options")?.unwrap_or_default();
    let overlap = advanced
        .get("overlap")
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| json!(p.i64_or("overlap", 0)));
    fields.push(("overlap".into(), overlap));

    for (key, value) in advanced {
        if key == "overlap" || value.is_null() || !ADVANCED_OPTIONS.contains(&key.as_str()) {
            continue;
        }
        fields.push((key, value));
    }
    Ok(fields)
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// Unstructured plugin.
pub struct UnstructuredPlugin {
    http: HttpClient,
}

impl UnstructuredPlugin {
    pub fn new(settings: &HttpSettings) -> Self {
        Self {
            http: settings.client(TIMEOUT_SECS),
        }
    }

    // -----------------------------------------------------------------------
    // Tool implementations
    // -----------------------------------------------------------------------

    async fn tool_partition(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let file_name = p.required_str(tool, "file_name")?;
        let encoded = p.required_str(tool, "file_content")?;
        let content = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| ToolError::invalid(tool, format!("file_content is not valid base64: {e}")))?;
        let fields = partition_fields(tool, p)?;
        let creds = UnstructuredCredentials::from_map(credentials)?;

        debug!(
            tool,
            file_name = %file_name,
            bytes = content.len(),
            remote = creds.server_type == ServerType::Remote,
            "partitioning document"
        );

        let mut form = Form::new().part("files", Part::bytes(content).file_name(file_name));
        for (name, value) in &fields {
            form = add_field(form, name, value);
        }

        let request = self
            .http
            .client()
            .post(creds.partition_url())
            .header("accept", "application/json")
            .header("unstructured-api-key", creds.key())
            .multipart(form);

        let response = self.http.send_json(tool, request).await?;
        let Value::Array(elements) = response else {
            return Err(ToolError::Decode {
                tool_name: tool.to_string(),
                reason: "expected a JSON array of elements".into(),
            });
        };

        let out = shape_elements(tool, elements)?;
        Ok(vec![
            ToolMessage::text(out.text),
            ToolMessage::variable("images", Value::Array(out.images)),
            ToolMessage::variable("elements", Value::Array(out.elements)),
        ])
    }
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

fn build_tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: "partition".into(),
        description: "Split a document into typed elements with the Unstructured API".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "file_name": {"type": "string", "description": "Original file name"},
                "file_content": {"type": "string", "description": "Base64 file content"},
                "strategy": {
                    "type": "string",
                    "enum": ["auto", "fast", "hi_res", "ocr_only", "vlm"],
                    "description": "Partition strategy (default: hi_res)"
                },
                "vlm_model": {"type": "string", "description": "VLM model (default: gpt-4o)"},
                "vlm_model_provider": {
                    "type": "string",
                    "description": "VLM provider (default: openai)"
                },
                "languages": {"type": "string", "description": "JSON array of OCR languages"},
                "chunking_strategy": {
                    "type": "string",
                    "enum": ["basic", "by_title", "by_page", "by_similarity"]
                },
                "max_characters": {"type": "integer", "description": "Chunk size (default: 500)"},
                "overlap": {"type": "integer", "description": "Chunk overlap (default: 0)"},
                "advanced_options": {
                    "type": "string",
                    "description": "JSON object of extra partition options"
                }
            },
            "required": ["file_name", "file_content"]
        }),
    }]
}

// ---------------------------------------------------------------------------
// Plugin trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialValidator for UnstructuredPlugin {
    async fn validate(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError> {
        let creds = UnstructuredCredentials::from_map(credentials)?;
        let request = self
            .http
            .client()
            .get(creds.healthcheck_url())
            .header("accept", "application/json")
            .header("unstructured-api-key", creds.key());
        let response = self.http.probe(PLUGIN_ID, request).await.map_err(|e| match e {
            CredentialValidationError::Rejected { provider, .. } => {
                CredentialValidationError::Rejected {
                    provider,
                    reason: "Please check your api_url".into(),
                }
            }
            other => other,
        })?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(CredentialValidationError::Rejected {
                provider: PLUGIN_ID.into(),
                reason: "Please check your api_url".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RequestHandler for UnstructuredPlugin {
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
            "partition" => self.tool_partition(tool, params, credentials).await,
            _ => Err(ToolError::UnknownTool {
                plugin_id: PLUGIN_ID.into(),
                tool_name: tool.to_string(),
            }),
        }
    }
}

impl Plugin for UnstructuredPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "Unstructured document partitioning"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
