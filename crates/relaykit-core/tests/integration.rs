//! Integration tests for the relaykit-core crate.
//!
//! These tests drive a small plugin end-to-end through the registry against
//! a mock HTTP server, checking the invocation boundary guarantees.

use std::sync::Arc;

use async_trait::async_trait;
use relaykit_core::{
    CredentialMap, CredentialValidationError, CredentialValidator, HttpClient, HttpSettings,
    Params, Plugin, PluginRegistry, RegistryError, RequestHandler, Result, ToolDefinition,
    ToolMessage,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Minimal plugin: one tool that GETs `/items/{id}` and forwards the body.
struct ItemPlugin {
    base_url: String,
    http: HttpClient,
}

#[async_trait]
impl CredentialValidator for ItemPlugin {
    async fn validate(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError> {
        let token = credentials.require("token")?;
        let req = self
            .http
            .client()
            .get(format!("{}/me", self.base_url))
            .bearer_auth(token);
        self.http.probe("items", req).await.map(|_| ())
    }
}

#[async_trait]
impl RequestHandler for ItemPlugin {
    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "get_item".into(),
            description: "Fetch one item".into(),
            parameters: json!({"type": "object", "required": ["id"]}),
        }]
    }

    async fn handle(
        &self,
        tool: &str,
        params: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let id = params.required_str(tool, "id")?;
        let token = credentials.require("token")?;
        let req = self
            .http
            .client()
            .get(format!("{}/items/{id}", self.base_url))
            .bearer_auth(token);
        Ok(vec![ToolMessage::json(self.http.send_json(tool, req).await?)])
    }
}

impl Plugin for ItemPlugin {
    fn id(&self) -> &str {
        "items"
    }

    fn description(&self) -> &str {
        "Item store"
    }
}

fn registry_for(base_url: &str) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(ItemPlugin {
        base_url: base_url.to_string(),
        http: HttpSettings::default().client(5),
    }));
    registry
}

fn creds() -> CredentialMap {
    CredentialMap::new().with("token", "t0k3n")
}

// ═══════════════════════════════════════════════════════════════════════
//  Invocation boundary
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn blank_required_param_yields_one_error_and_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let out = registry_for(&server.uri())
        .invoke("items", "get_item", &Params::new().with("id", "   "), &creds())
        .await
        .unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].as_json().unwrap()["success"], false);
}

#[tokio::test]
async fn success_body_is_forwarded_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let out = registry_for(&server.uri())
        .invoke("items", "get_item", &Params::new().with("id", "1"), &creds())
        .await
        .unwrap();

    assert_eq!(out, vec![ToolMessage::json(json!({"success": true, "id": 1}))]);
}

#[tokio::test]
async fn transport_failure_becomes_failure_message() {
    let out = registry_for("http://127.0.0.1:1")
        .invoke("items", "get_item", &Params::new().with("id", "1"), &creds())
        .await
        .unwrap();

    assert_eq!(out.len(), 1);
    let body = out[0].as_json().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "transport");
    assert!(body["error_msg"].as_str().unwrap().contains("Network request failed"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Provider validation
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn validate_rejects_missing_key_before_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = registry_for(&server.uri())
        .validate("items", &CredentialMap::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Validation(CredentialValidationError::Missing { .. })
    ));
}

#[tokio::test]
async fn validate_accepts_good_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    registry_for(&server.uri())
        .validate("items", &creds())
        .await
        .unwrap();
}
