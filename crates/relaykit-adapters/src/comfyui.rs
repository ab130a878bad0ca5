//! ComfyUI server plugin.
//!
//! Read-only queries against a ComfyUI instance: model folders and the
//! sampler and scheduler names accepted by `KSampler`.  Workflow execution
//! is not covered.

use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use relaykit_core::{
    CredentialMap, CredentialValidationError, CredentialValidator, HttpClient, HttpSettings,
    Params, Plugin, RequestHandler, Result, ToolDefinition, ToolError, ToolMessage,
};

const TIMEOUT_SECS: u64 = 10;

const PLUGIN_ID: &str = "comfyui";

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Typed ComfyUI credentials.
pub struct ComfyUiCredentials {
    /// Server root, always ending in `/`.
    pub base_url: Url,
    pub api_key: Option<String>,
}

impl ComfyUiCredentials {
    pub fn from_map(
        credentials: &CredentialMap,
    ) -> std::result::Result<Self, CredentialValidationError> {
        let raw = credentials.require("base_url")?;
        let base_url = Url::parse(&format!("{}/", raw.trim_end_matches('/'))).map_err(|e| {
            CredentialValidationError::Invalid {
                key: "base_url".into(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            base_url,
            api_key: credentials.get("comfyui_api_key").map(str::to_string),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Loader nodes whose first choice list names the files of one model folder.
const MODEL_LOADERS: [(&str, &str, &str); 8] = [
    ("CheckpointLoaderSimple", "ckpt_name", "checkpoints"),
    ("LoraLoader", "lora_name", "loras"),
    ("VAELoader", "vae_name", "vae"),
    ("ControlNetLoader", "control_net_name", "controlnet"),
    ("UpscaleModelLoader", "model_name", "upscale_models"),
    ("UNETLoader", "unet_name", "diffusion_models"),
    ("CLIPLoader", "clip_name", "text_encoders"),
    ("CLIPVisionLoader", "clip_name", "clip_vision"),
];

/// Every `folder/file` the loader nodes offer.
fn loader_models(object_info: &Value) -> Value {
    let models: Vec<String> = MODEL_LOADERS
        .iter()
        .flat_map(|(node, input, folder)| {
            object_info[*node]["input"]["required"][*input][0]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(move |name| format!("{folder}/{name}"))
        })
        .collect();
    json!(models)
}

/// `KSampler.input.required.<field>[0]`, the list of accepted names.
fn ksampler_choices(object_info: &Value, field: &str) -> Value {
    match &object_info["KSampler"]["input"]["required"][field][0] {
        Value::Array(names) => Value::Array(names.clone()),
        _ => json!([]),
    }
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// ComfyUI plugin.
pub struct ComfyUiPlugin {
    http: HttpClient,
}

impl ComfyUiPlugin {
    pub fn new(settings: &HttpSettings) -> Self {
        Self {
            http: settings.client(TIMEOUT_SECS),
        }
    }

    fn get(&self, creds: &ComfyUiCredentials, segments: &[&str]) -> reqwest::RequestBuilder {
        let request = self.http.client().get(creds.endpoint(segments));
        match &creds.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// GET returning JSON, with a non-success status read as "nothing".
    async fn get_or_null(
        &self,
        tool: &str,
        creds: &ComfyUiCredentials,
        segments: &[&str],
    ) -> Result<Value> {
        match self.http.send_json(tool, self.get(creds, segments)).await {
            Err(ToolError::Upstream { .. }) => Ok(Value::Null),
            other => other,
        }
    }

    // -----------------------------------------------------------------------
    // Tool implementations
    // -----------------------------------------------------------------------

    async fn tool_list_models(
        &self,
        tool: &str,
        p: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let creds = ComfyUiCredentials::from_map(credentials)?;
        let model_type = p.optional_str("model_type");
        let segments: Vec<&str> = std::iter::once("models")
            .chain(model_type.as_deref())
            .collect();

        let models = match self.get_or_null(tool, &creds, &segments).await? {
            list @ Value::Array(_) => list,
            _ => json!([]),
        };
        Ok(vec![ToolMessage::variable("models", models)])
    }

    async fn tool_list_samplers(
        &self,
        tool: &str,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let creds = ComfyUiCredentials::from_map(credentials)?;
        let info = self.get_or_null(tool, &creds, &["object_info"]).await?;
        Ok(vec![
            ToolMessage::variable("models", loader_models(&info)),
            ToolMessage::variable("sampling_methods", ksampler_choices(&info, "sampler_name")),
            ToolMessage::variable("schedulers", ksampler_choices(&info, "scheduler")),
        ])
    }
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

fn build_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_models".into(),
            description: "List model folders, or the models inside one folder".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "model_type": {
                        "type": "string",
                        "description": "Folder such as checkpoints or loras; omit for the folder list"
                    }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "list_samplers".into(),
            description: "List loadable models and the sampler and scheduler names KSampler accepts".into(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        },
    ]
}

// ---------------------------------------------------------------------------
// Plugin trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialValidator for ComfyUiPlugin {
    async fn validate(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError> {
        let creds = ComfyUiCredentials::from_map(credentials)?;
        self.http
            .probe(PLUGIN_ID, self.get(&creds, &["models"]))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl RequestHandler for ComfyUiPlugin {
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
            "list_models" => self.tool_list_models(tool, params, credentials).await,
            "list_samplers" => self.tool_list_samplers(tool, credentials).await,
            _ => Err(ToolError::UnknownTool {
                plugin_id: PLUGIN_ID.into(),
                tool_name: tool.to_string(),
            }),
        }
    }
}

impl Plugin for ComfyUiPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "ComfyUI model and sampler listings"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(base: &str) -> ComfyUiCredentials {
        ComfyUiCredentials::from_map(&CredentialMap::new().with("base_url", base)).unwrap()
    }

    #[test]
    fn endpoint_appends_segments() {
        let c = creds("http://127.0.0.1:8188");
        assert_eq!(c.endpoint(&["models"]).as_str(), "http://127.0.0.1:8188/models");

        let c = creds("https://host.test/comfy/");
        assert_eq!(
            c.endpoint(&["object_info", "KSampler"]).as_str(),
            "https://host.test/comfy/object_info/KSampler"
        );
    }

    #[test]
    fn base_url_is_required() {
        assert!(matches!(
            ComfyUiCredentials::from_map(&CredentialMap::new()),
            Err(CredentialValidationError::Missing { .. })
        ));
    }

    #[test]
    fn ksampler_choices_reads_first_entry() {
        let info = json!({
            "KSampler": {"input": {"required": {
                "sampler_name": [["euler", "dpmpp_2m"], {}],
                "scheduler": [["normal", "karras"]]
            }}}
        });
        assert_eq!(ksampler_choices(&info, "sampler_name"), json!(["euler", "dpmpp_2m"]));
        assert_eq!(ksampler_choices(&info, "scheduler"), json!(["normal", "karras"]));
        assert_eq!(ksampler_choices(&Value::Null, "scheduler"), json!([]));
    }

    #[test]
    fn loader_models_prefix_folder() {
        let info = json!({
            "CheckpointLoaderSimple": {"input": {"required": {
                "ckpt_name": [["sd15.safetensors", "sdxl.safetensors"]]
            }}},
            "LoraLoader": {"input": {"required": {"lora_name": [["detail.safetensors"]]}}}
        });
        assert_eq!(
            loader_models(&info),
            json!([
                "checkpoints/sd15.safetensors",
                "checkpoints/sdxl.safetensors",
                "loras/detail.safetensors"
            ])
        );
        assert_eq!(loader_models(&Value::Null), json!([]));
    }
}
