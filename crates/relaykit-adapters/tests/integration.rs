//! Integration tests for the relaykit-adapters crate.
//!
//! Each plugin is driven through a [`PluginRegistry`] against a wiremock
//! server standing in for the real service.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use relaykit_adapters::{
    BrightDataPlugin, ComfyUiPlugin, ConfluencePlugin, E2bPlugin, GeminiImagePlugin, HapPlugin,
    HackerNewsPlugin, JiandaoyunPlugin, UnstructuredPlugin, builtin_registry,
};
use relaykit_core::{
    CredentialMap, CredentialValidationError, HttpSettings, Params, Plugin, PluginRegistry,
    RegistryError, ToolMessage,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> HttpSettings {
    HttpSettings::default()
}

fn registry_with(plugin: Arc<dyn Plugin>) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(plugin);
    registry
}

/// A mock that fails the test if any request reaches it.
async fn silent_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    server
}

// ═══════════════════════════════════════════════════════════════════════
//  Builtin registry
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn builtin_registry_routes_unknown_names() {
    let registry = builtin_registry(&settings());
    assert_eq!(registry.len(), 9);

    let err = registry
        .invoke("nope", "x", &Params::new(), &CredentialMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::PluginNotFound { .. }));

    let err = registry
        .invoke("hackernews", "nope", &Params::new(), &CredentialMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::ToolNotFound { .. }));
}

#[tokio::test]
async fn providers_reject_missing_keys_without_network() {
    let registry = builtin_registry(&settings());
    for plugin_id in ["hap", "jiandaoyun", "brightdata", "gemini_image", "unstructured", "comfyui", "e2b", "confluence"] {
        let err = registry
            .validate(plugin_id, &CredentialMap::new())
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                RegistryError::Validation(CredentialValidationError::Missing { .. })
            ),
            "{plugin_id}: {err:?}"
        );
    }
}

/// Every plugin pointed at `server`, with credentials that pass the
/// format checks.
fn silent_registry(server: &MockServer) -> (PluginRegistry, Vec<(&'static str, CredentialMap)>) {
    let uri = server.uri();
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(HapPlugin::new(&settings())));
    registry.register(Arc::new(JiandaoyunPlugin::new(&settings())));
    registry.register(Arc::new(HackerNewsPlugin::with_base_url(&settings(), &uri)));
    registry.register(Arc::new(BrightDataPlugin::with_base_url(&settings(), &uri)));
    registry.register(Arc::new(GeminiImagePlugin::with_base_url(&settings(), &uri)));
    registry.register(Arc::new(UnstructuredPlugin::new(&settings())));
    registry.register(Arc::new(ComfyUiPlugin::new(&settings())));
    registry.register(Arc::new(E2bPlugin::with_base_url(&settings(), &uri)));
    registry.register(Arc::new(ConfluencePlugin::new(&settings())));

    let credentials = vec![
        ("hap", hap_creds(&uri)),
        (
            "jiandaoyun",
            CredentialMap::new()
                .with("jiandaoyun_api_key", "jdy-key")
                .with("base_url", uri.as_str()),
        ),
        ("hackernews", CredentialMap::new()),
        ("brightdata", CredentialMap::new().with("api_token", "bd-token-123")),
        ("gemini_image", CredentialMap::new().with("gemini_api_key", "g-key")),
        ("unstructured", CredentialMap::new().with("api_url", uri.as_str())),
        ("comfyui", CredentialMap::new().with("base_url", uri.as_str())),
        ("e2b", CredentialMap::new().with("api_key", "e2b-key")),
        (
            "confluence",
            CredentialMap::new().with("url", uri.as_str()).with("token", "pat"),
        ),
    ];
    (registry, credentials)
}

#[tokio::test]
async fn missing_or_blank_required_params_never_reach_the_network() {
    let server = silent_server().await;
    let (registry, credentials) = silent_registry(&server);
    assert_eq!(credentials.len(), registry.len());

    let mut checked = 0;
    for (plugin_id, creds) in &credentials {
        let plugin = registry.get(plugin_id).unwrap();
        for tool in plugin.tools() {
            let required: Vec<String> = tool.parameters["required"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();

            for name in &required {
                for blank in [None, Some("  ")] {
                    let mut params = Params::new();
                    for other in required.iter().filter(|other| *other != name) {
                        params = params.with(other.as_str(), "x");
                    }
                    if let Some(value) = blank {
                        params = params.with(name.as_str(), value);
                    }

                    let out = registry
                        .invoke(plugin_id, &tool.name, &params, creds)
                        .await
                        .unwrap();
                    let case = format!("{plugin_id}/{} without {name} ({blank:?})", tool.name);
                    assert_eq!(out.len(), 1, "{case}: {out:?}");
                    let error_shaped = match &out[0] {
                        ToolMessage::Text { .. } => true,
                        ToolMessage::Json { json } => {
                            json.get("error").is_some() || json["success"] == false
                        }
                        ToolMessage::Variable { .. } => false,
                    };
                    assert!(error_shaped, "{case}: {out:?}");
                    checked += 1;
                }
            }
        }
    }
    assert!(checked > 100, "only {checked} cases ran");
}

// ═══════════════════════════════════════════════════════════════════════
//  HAP
// ═══════════════════════════════════════════════════════════════════════

fn hap_creds(base: &str) -> CredentialMap {
    CredentialMap::new()
        .with("appkey", "appkey-123456")
        .with("sign", "sign-abcdef")
        .with("api_base", base)
}

#[tokio::test]
async fn hap_missing_param_is_one_error_and_no_request() {
    let server = silent_server().await;
    let out = builtin_registry(&settings())
        .invoke("hap", "get_record", &Params::new().with("worksheet_id", "ws1"), &hap_creds(&server.uri()))
        .await
        .unwrap();
    assert_eq!(out, vec![ToolMessage::json(json!({"error": "Missing parameter: row_id"}))]);
}

#[tokio::test]
async fn hap_success_is_forwarded_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/app/worksheets/ws1/rows/r1"))
        .and(header("HAP-Appkey", "appkey-123456"))
        .and(header("HAP-Sign", "sign-abcdef"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let params = Params::new().with("worksheet_id", "ws1").with("row_id", "r1");
    let out = builtin_registry(&settings())
        .invoke("hap", "get_record", &params, &hap_creds(&server.uri()))
        .await
        .unwrap();
    assert_eq!(out, vec![ToolMessage::json(json!({"success": true, "id": 1}))]);
}

#[tokio::test]
async fn hap_transport_failure_is_one_failure_message() {
    let params = Params::new().with("worksheet_id", "ws1").with("row_id", "r1");
    let out = builtin_registry(&settings())
        .invoke("hap", "get_record", &params, &hap_creds("http://127.0.0.1:1"))
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
    let body = out[0].as_json().unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error_msg"].as_str().unwrap().starts_with("Request failed: "));
}

#[tokio::test]
async fn hap_list_records_can_render_a_table() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/app/worksheets/ws1/rows/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"rows": [{"id": "r1", "name": "Alpha"}], "total": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = Params::new()
        .with("worksheet_id", "ws1")
        .with("result_type", "table");
    let out = builtin_registry(&settings())
        .invoke("hap", "list_records", &params, &hap_creds(&server.uri()))
        .await
        .unwrap();
    let body = out[0].as_json().unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], "Found 1 rows.\n\n|id|name|\n|---|---|\n|r1|Alpha|");
}

#[tokio::test]
async fn hap_validate_requires_success_flag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false, "error_msg": "bad sign"})))
        .mount(&server)
        .await;

    let err = builtin_registry(&settings())
        .validate("hap", &hap_creds(&server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Validation(CredentialValidationError::Rejected { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════
//  Jiandaoyun
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn jiandaoyun_get_apps_renders_table() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v5/app/list"))
        .and(header("authorization", "Bearer jdy-key"))
        .and(body_json(json!({"limit": 10, "skip": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apps": [{"app_id": "a1", "name": "CRM"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let creds = CredentialMap::new()
        .with("jiandaoyun_api_key", "jdy-key")
        .with("base_url", server.uri());
    let plugin = Arc::new(JiandaoyunPlugin::new(&settings()));
    let out = registry_with(plugin)
        .invoke("jiandaoyun", "get_apps", &Params::new().with("output_type", "table"), &creds)
        .await
        .unwrap();
    assert_eq!(out, vec![ToolMessage::text("app_id | name\n--- | ---\na1 | CRM")]);
}

// ═══════════════════════════════════════════════════════════════════════
//  Hacker News
// ═══════════════════════════════════════════════════════════════════════

fn hackernews(server: &MockServer) -> PluginRegistry {
    let base = format!("{}/v0", server.uri());
    registry_with(Arc::new(HackerNewsPlugin::with_base_url(&settings(), &base)))
}

#[tokio::test]
async fn hackernews_top_stories_limits_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/beststories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([5, 4, 3, 2, 1])))
        .expect(1)
        .mount(&server)
        .await;

    let params = Params::new().with("story_type", "best").with("limit", "3");
    let out = hackernews(&server)
        .invoke("hackernews", "get_top_stories", &params, &CredentialMap::new())
        .await
        .unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(
        out[1].as_json().unwrap(),
        &json!({"story_type": "best", "count": 3, "story_ids": [5, 4, 3]})
    );
}

#[tokio::test]
async fn hackernews_story_info_strips_html() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/item/8863.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 8863,
            "by": "dhouston",
            "score": 111,
            "time": 1175714200,
            "title": "My YC app",
            "type": "story",
            "text": "<p>Hello <i>there</i></p>",
            "descendants": 71
        })))
        .mount(&server)
        .await;

    let out = hackernews(&server)
        .invoke("hackernews", "get_story_info", &Params::new().with("story_id", "8863"), &CredentialMap::new())
        .await
        .unwrap();
    assert_eq!(out.len(), 2);
    assert!(out[0].as_text().unwrap().starts_with("**My YC app**"));
    let info = out[1].as_json().unwrap();
    assert_eq!(info["content"], "Hello there");
    assert_eq!(info["author"], "dhouston");
    assert_eq!(info["created"], "2007-04-04 19:16:40");
}

#[tokio::test]
async fn hackernews_comment_is_not_a_story() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/item/2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "type": "comment"})))
        .mount(&server)
        .await;

    let out = hackernews(&server)
        .invoke("hackernews", "get_story_info", &Params::new().with("story_id", 2), &CredentialMap::new())
        .await
        .unwrap();
    assert_eq!(out, vec![ToolMessage::text("Item 2 is not a story (type: comment)")]);
}

#[tokio::test]
async fn hackernews_unknown_user_is_not_found_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/user/ghost.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let out = hackernews(&server)
        .invoke("hackernews", "get_user_info", &Params::new().with("username", "ghost"), &CredentialMap::new())
        .await
        .unwrap();
    assert_eq!(out, vec![ToolMessage::text("User 'ghost' not found on Hacker News")]);
}

#[tokio::test]
async fn hackernews_username_stays_inside_its_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/user/pg.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "pg", "karma": 1})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .expect(1)
        .mount(&server)
        .await;

    let params = Params::new().with("username", "pg.json?x=");
    let out = hackernews(&server)
        .invoke("hackernews", "get_user_info", &params, &CredentialMap::new())
        .await
        .unwrap();
    assert_eq!(out, vec![ToolMessage::text("User 'pg.json?x=' not found on Hacker News")]);
}

#[tokio::test]
async fn hackernews_upstream_error_is_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let out = hackernews(&server)
        .invoke("hackernews", "get_top_stories", &Params::new(), &CredentialMap::new())
        .await
        .unwrap();
    assert_eq!(out, vec![ToolMessage::text("Failed to fetch stories. HTTP 503")]);
}

#[tokio::test]
async fn hackernews_validate_probes_top_stories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/topstories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1])))
        .expect(1)
        .mount(&server)
        .await;

    hackernews(&server)
        .validate("hackernews", &CredentialMap::new())
        .await
        .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════
//  Bright Data
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn brightdata_scrape_wraps_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/request"))
        .and(header("authorization", "Bearer bd-token-123"))
        .and(body_json(json!({
            "url": "https://example.test",
            "zone": "dify_plugin",
            "format": "raw",
            "data_format": "markdown"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("# Example"))
        .expect(1)
        .mount(&server)
        .await;

    let registry = registry_with(Arc::new(BrightDataPlugin::with_base_url(&settings(), &server.uri())));
    let creds = CredentialMap::new().with("api_token", "bd-token-123");
    let out = registry
        .invoke("brightdata", "scrape", &Params::new().with("url", "https://example.test"), &creds)
        .await
        .unwrap();
    let body = out[0].as_json().unwrap();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["web_info_list"][0]["content"], "# Example");
}

#[tokio::test]
async fn brightdata_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("zone not found"))
        .mount(&server)
        .await;

    let registry = registry_with(Arc::new(BrightDataPlugin::with_base_url(&settings(), &server.uri())));
    let creds = CredentialMap::new().with("api_token", "bd-token-123");
    let out = registry
        .invoke("brightdata", "scrape", &Params::new().with("url", "https://example.test"), &creds)
        .await
        .unwrap();
    let body = out[0].as_json().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error_msg"], "HTTP 403: zone not found");
    assert_eq!(body["error_kind"], "upstream");
}

// ═══════════════════════════════════════════════════════════════════════
//  Gemini image
// ═══════════════════════════════════════════════════════════════════════

fn gemini(server: &MockServer) -> PluginRegistry {
    registry_with(Arc::new(GeminiImagePlugin::with_base_url(&settings(), &server.uri())))
}

#[tokio::test]
async fn gemini_emits_texts_then_images() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash-image-preview:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [
                {"text": "A cat"},
                {"inlineData": {"mimeType": "image/png", "data": "iVBORw0K"}}
            ]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let creds = CredentialMap::new().with("gemini_api_key", "g-key");
    let out = gemini(&server)
        .invoke("gemini_image", "image_generate", &Params::new().with("prompt", "a cat"), &creds)
        .await
        .unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0], ToolMessage::text("A cat"));
    assert_eq!(
        out[1],
        ToolMessage::variable(
            "images",
            json!([{"filename": "output0.png", "mime_type": "image/png", "data": "iVBORw0K"}])
        )
    );
}

#[tokio::test]
async fn gemini_warns_on_many_images_and_reports_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "API key not valid"}
        })))
        .mount(&server)
        .await;

    let image = json!({"mime_type": "image/png", "data": STANDARD.encode(b"png")});
    let params = Params::new()
        .with("prompt", "merge")
        .with("images", json!([image.clone(), image.clone(), image.clone(), image]));
    let creds = CredentialMap::new().with("gemini_api_key", "bad");
    let plugin = GeminiImagePlugin::with_base_url(&settings(), &server.uri());

    let out = relaykit_core::invoke(&plugin, "image_generate", &params, &creds).await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].as_json().unwrap()["error_msg"], "API key not valid");
}

// ═══════════════════════════════════════════════════════════════════════
//  Unstructured
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn unstructured_partition_uploads_and_joins_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/general/v0/general"))
        .and(header("unstructured-api-key", "u-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "Title", "element_id": "e1", "text": "Report. ", "metadata": {}},
            {"type": "NarrativeText", "element_id": "e2", "text": "All good.", "metadata": {}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let creds = CredentialMap::new()
        .with("api_url", server.uri())
        .with("server_type", "remote")
        .with("api_key", "u-key");
    let params = Params::new()
        .with("file_name", "report.txt")
        .with("file_content", STANDARD.encode(b"Report. All good."));
    let out = registry_with(Arc::new(UnstructuredPlugin::new(&settings())))
        .invoke("unstructured", "partition", &params, &creds)
        .await
        .unwrap();

    assert_eq!(out[0], ToolMessage::text("Report. All good."));
    match &out[2] {
        ToolMessage::Variable { name, value } => {
            assert_eq!(name, "elements");
            assert_eq!(value.as_array().map(Vec::len), Some(2));
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn unstructured_error_status_keeps_upstream_kind() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/general/v0/general"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let creds = CredentialMap::new().with("api_url", server.uri());
    let params = Params::new()
        .with("file_name", "a.txt")
        .with("file_content", STANDARD.encode(b"hello"));
    let out = registry_with(Arc::new(UnstructuredPlugin::new(&settings())))
        .invoke("unstructured", "partition", &params, &creds)
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
    let body = out[0].as_json().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error_msg"], "HTTP 500: boom");
    assert_eq!(body["error_kind"], "upstream");
}

#[tokio::test]
async fn unstructured_validate_hits_healthcheck() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthcheck"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"healthcheck": "HEALTHCHECK STATUS: EVERYTHING OK!"})))
        .expect(1)
        .mount(&server)
        .await;

    let creds = CredentialMap::new().with("api_url", format!("{}/general/v0/general", server.uri()));
    registry_with(Arc::new(UnstructuredPlugin::new(&settings())))
        .validate("unstructured", &creds)
        .await
        .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════
//  ComfyUI
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn comfyui_lists_models_and_samplers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/checkpoints"))
        .and(header("authorization", "Bearer c-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["sd15.safetensors"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/object_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "KSampler": {"input": {"required": {
                "sampler_name": [["euler"]],
                "scheduler": [["karras"]]
            }}},
            "CheckpointLoaderSimple": {"input": {"required": {
                "ckpt_name": [["sd15.safetensors"]]
            }}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = registry_with(Arc::new(ComfyUiPlugin::new(&settings())));
    let creds = CredentialMap::new()
        .with("base_url", server.uri())
        .with("comfyui_api_key", "c-key");

    let out = registry
        .invoke("comfyui", "list_models", &Params::new().with("model_type", "checkpoints"), &creds)
        .await
        .unwrap();
    assert_eq!(out, vec![ToolMessage::variable("models", json!(["sd15.safetensors"]))]);

    let out = registry
        .invoke("comfyui", "list_samplers", &Params::new(), &creds)
        .await
        .unwrap();
    assert_eq!(
        out,
        vec![
            ToolMessage::variable("models", json!(["checkpoints/sd15.safetensors"])),
            ToolMessage::variable("sampling_methods", json!(["euler"])),
            ToolMessage::variable("schedulers", json!(["karras"])),
        ]
    );
}

#[tokio::test]
async fn comfyui_missing_folder_is_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let creds = CredentialMap::new().with("base_url", server.uri());
    let out = registry_with(Arc::new(ComfyUiPlugin::new(&settings())))
        .invoke("comfyui", "list_models", &Params::new().with("model_type", "nope"), &creds)
        .await
        .unwrap();
    assert_eq!(out, vec![ToolMessage::variable("models", json!([]))]);
}

// ═══════════════════════════════════════════════════════════════════════
//  E2B
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn e2b_lists_sandboxes_with_api_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sandboxes"))
        .and(header("X-API-Key", "e2b-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"sandboxID": "sb1"}])))
        .expect(2)
        .mount(&server)
        .await;

    let registry = registry_with(Arc::new(E2bPlugin::with_base_url(&settings(), &server.uri())));
    let creds = CredentialMap::new().with("api_key", "e2b-key");
    registry.validate("e2b", &creds).await.unwrap();

    let out = registry
        .invoke("e2b", "list_sandboxes", &Params::new(), &creds)
        .await
        .unwrap();
    assert_eq!(
        out,
        vec![ToolMessage::json(json!({"count": 1, "sandboxes": [{"sandboxID": "sb1"}]}))]
    );
}

// ═══════════════════════════════════════════════════════════════════════
//  Confluence
// ═══════════════════════════════════════════════════════════════════════

fn confluence_creds(server: &MockServer) -> CredentialMap {
    CredentialMap::new()
        .with("url", server.uri())
        .with("token", "pat")
}

#[tokio::test]
async fn confluence_get_page_returns_plain_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/42"))
        .and(query_param("expand", "body.storage,version"))
        .and(header("authorization", "Bearer pat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "42",
            "type": "page",
            "title": "Runbook",
            "version": {"number": 2},
            "body": {"storage": {"value": "<h1>Steps</h1><p>Reboot</p>"}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let out = registry_with(Arc::new(ConfluencePlugin::new(&settings())))
        .invoke("confluence", "get_page", &Params::new().with("page_id", "42"), &confluence_creds(&server))
        .await
        .unwrap();
    assert_eq!(out[0].as_json().unwrap()["content"], "Steps Reboot");
    assert_eq!(out[2], ToolMessage::variable("title", json!("Runbook")));
}

#[tokio::test]
async fn confluence_missing_page_is_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let out = registry_with(Arc::new(ConfluencePlugin::new(&settings())))
        .invoke("confluence", "get_page", &Params::new().with("page_id", "7"), &confluence_creds(&server))
        .await
        .unwrap();
    let body: &Value = out[0].as_json().unwrap();
    assert_eq!(body["error_msg"], "Page with ID '7' not found");
    assert_eq!(body["error_kind"], "service");
}

#[tokio::test]
async fn confluence_search_passes_cql_and_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/search"))
        .and(query_param("cql", "type=page"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "1", "type": "page", "title": "A", "_links": {"webui": "/x/1"}}],
            "totalSize": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = Params::new().with("cql", "type=page").with("limit", 5);
    let out = registry_with(Arc::new(ConfluencePlugin::new(&settings())))
        .invoke("confluence", "search", &params, &confluence_creds(&server))
        .await
        .unwrap();
    let body = out[0].as_json().unwrap();
    assert_eq!(body["size"], 1);
    assert_eq!(body["results"][0]["link"], "/x/1");
}
