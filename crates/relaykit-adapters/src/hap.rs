//! HAP (Mingdao) v3 OpenAPI plugin.
//!
//! Covers application info, worksheets, records, option sets, roles,
//! workflows, and the public department/region lookups.  Every tool maps to
//! exactly one OpenAPI call authenticated with the `HAP-Appkey` and
//! `HAP-Sign` headers; the decoded response is forwarded as a single JSON
//! message.
//!
//! Parameter problems are reported as `{"error": ...}`, every other failure
//! as `{"success": false, "error_msg": "Request failed: ..."}`.

use std::fmt;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value, json};
use tracing::debug;

use relaykit_core::{
    CredentialMap, CredentialValidationError, CredentialValidator, HttpClient, HttpSettings,
    Params, Plugin, RequestHandler, Result, ToolDefinition, ToolError, ToolMessage,
};

/// Default HAP API base URL.
const DEFAULT_API_BASE: &str = "https://api2.mingdao.com";

/// Request timeout for every HAP call.
const TIMEOUT_SECS: u64 = 120;

/// Largest page the records endpoints accept.
const MAX_PAGE_SIZE: i64 = 1000;

const PLUGIN_ID: &str = "hap";

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Typed HAP credentials.
pub struct HapCredentials {
    pub appkey: String,
    pub sign: String,
    /// Normalised base URL without a trailing slash.
    pub api_base: String,
}

impl HapCredentials {
    /// Build from the raw credential map.
    pub fn from_map(
        credentials: &CredentialMap,
    ) -> std::result::Result<Self, CredentialValidationError> {
        let appkey = credentials.require("appkey")?.to_string();
        let sign = credentials.require("sign")?.to_string();
        let api_base = normalize_api_base(credentials.get("api_base").unwrap_or(DEFAULT_API_BASE))?;
        Ok(Self {
            appkey,
            sign,
            api_base,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.api_base)
        } else {
            format!("{}/{path}", self.api_base)
        }
    }
}

impl fmt::Debug for HapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HapCredentials")
            .field("appkey", &mask(&self.appkey))
            .field("sign", &mask(&self.sign))
            .field("api_base", &self.api_base)
            .finish()
    }
}

fn normalize_api_base(raw: &str) -> std::result::Result<String, CredentialValidationError> {
    let base = raw.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(CredentialValidationError::Invalid {
            key: "api_base".into(),
            reason: "api_base must start with http:// or https://".into(),
        });
    }
    Ok(base.trim_end_matches('/').to_string())
}

/// Keep the first and last three characters; shorter values are starred out.
fn mask(value: &str) -> String {
    const KEEP: usize = 3;
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= KEEP * 2 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..KEEP].iter().collect();
    let tail: String = chars[chars.len() - KEEP..].iter().collect();
    format!("{head}...{tail}")
}

// ---------------------------------------------------------------------------
// Planned request
// ---------------------------------------------------------------------------

/// One OpenAPI call, fully determined by the tool parameters.
#[derive(Debug)]
struct ApiCall {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
}

impl ApiCall {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    fn body(mut self, body: Map<String, Value>) -> Self {
        self.body = Some(Value::Object(body));
        self
    }
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// HAP worksheet plugin.
pub struct HapPlugin {
    http: HttpClient,
}

impl HapPlugin {
    pub fn new(settings: &HttpSettings) -> Self {
        Self {
            http: settings.client(TIMEOUT_SECS),
        }
    }

    fn request(&self, credentials: &HapCredentials, call: &ApiCall) -> reqwest::RequestBuilder {
        let url = credentials.url(&call.path);
        debug!(
            method = %call.method,
            url = %url,
            appkey = %mask(&credentials.appkey),
            sign = %mask(&credentials.sign),
            "HAP request"
        );

        let mut request = self
            .http
            .client()
            .request(call.method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .header("HAP-Appkey", &credentials.appkey)
            .header("HAP-Sign", &credentials.sign);
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }
        request
    }
}

// ---------------------------------------------------------------------------
// Tool planning
// ---------------------------------------------------------------------------

/// Percent-encode one caller-supplied path segment.
fn seg(value: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(value)
}

fn rows_path(worksheet_id: &str) -> String {
    format!("/v3/app/worksheets/{}/rows", seg(worksheet_id))
}

fn trigger_workflow(p: &Params) -> bool {
    !p.flag("do_not_trigger_workflow", false)
}

fn put(body: &mut Map<String, Value>, key: &str, value: impl Into<Value>) {
    body.insert(key.to_string(), value.into());
}

/// Turn a tool call into an [`ApiCall`] without touching the network.
fn plan(tool: &str, p: &Params) -> Result<ApiCall> {
    match tool {
        "get_app_info" => Ok(ApiCall::get("/v3/app")),
        "create_worksheet" => create_worksheet(tool, p),
        "update_worksheet" => update_worksheet(tool, p),
        "delete_worksheet" => {
            let ws = p.required_str(tool, "worksheet_id")?;
            Ok(ApiCall::delete(format!("/v3/app/worksheets/{}", seg(&ws))))
        }
        "list_records" => list_records(tool, p),
        "get_record" => {
            let ws = p.required_str(tool, "worksheet_id")?;
            let row = p.required_str(tool, "row_id")?;
            let mut call = ApiCall::get(format!("{}/{}", rows_path(&ws), seg(&row)));
            if let Some(flag) = p.optional_flag("include_system_fields") {
                call = call.query("includeSystemFields", flag);
            }
            Ok(call)
        }
        "update_record" => update_record(tool, p),
        "delete_record" => {
            let ws = p.required_str(tool, "worksheet_id")?;
            let row = p.required_str(tool, "row_id")?;
            let mut body = Map::new();
            put(&mut body, "triggerWorkflow", trigger_workflow(p));
            if let Some(permanent) = p.optional_flag("permanent") {
                put(&mut body, "permanent", permanent);
            }
            Ok(ApiCall::delete(format!("{}/{}", rows_path(&ws), seg(&row))).body(body))
        }
        "batch_create_records" => {
            let ws = p.required_str(tool, "worksheet_id")?;
            let rows = p.required_array(tool, "rows")?;
            if rows.is_empty() {
                return Err(ToolError::invalid(tool, "rows must be a non-empty JSON array"));
            }
            let mut body = Map::new();
            put(&mut body, "rows", rows);
            if p.optional_flag("do_not_trigger_workflow").is_some() {
                put(&mut body, "triggerWorkflow", trigger_workflow(p));
            }
            Ok(ApiCall::post(format!("{}/batch", rows_path(&ws))).body(body))
        }
        "batch_update_records" => {
            let ws = p.required_str(tool, "worksheet_id")?;
            let row_ids = p.id_list("row_ids");
            if row_ids.is_empty() {
                return Err(ToolError::invalid(tool, "Missing parameter: row_ids"));
            }
            let fields = p.required_array(tool, "fields")?;
            let mut body = Map::new();
            put(&mut body, "rowIds", row_ids);
            put(&mut body, "fields", fields);
            if p.optional_flag("do_not_trigger_workflow").is_some() {
                put(&mut body, "triggerWorkflow", trigger_workflow(p));
            }
            Ok(ApiCall::patch(format!("{}/batch", rows_path(&ws))).body(body))
        }
        "batch_delete_records" => {
            let ws = p.required_str(tool, "worksheet_id")?;
            let row_ids = p.id_list("row_ids");
            if row_ids.is_empty() {
                return Err(ToolError::invalid(tool, "Missing parameter: row_ids"));
            }
            let mut body = Map::new();
            put(&mut body, "rowIds", row_ids);
            if let Some(permanent) = p.optional_flag("permanent") {
                put(&mut body, "permanent", permanent);
            }
            if p.optional_flag("do_not_trigger_workflow").is_some() {
                put(&mut body, "triggerWorkflow", trigger_workflow(p));
            }
            Ok(ApiCall::delete(format!("{}/batch", rows_path(&ws))).body(body))
        }
        "get_record_discussions" => {
            let ws = p.required_str(tool, "worksheet_id")?;
            let row = p.required_str(tool, "row_id")?;
            let mut call = paged(
                ApiCall::get(format!("{}/{}/discussions", rows_path(&ws), seg(&row))),
                p,
            );
            if let Some(search) = p.optional_str("search") {
                call = call.query("search", search);
            }
            if let Some(flag) = p.optional_flag("only_with_attachments") {
                call = call.query("onlyWithAttachments", flag);
            }
            Ok(call)
        }
        "get_record_logs" => {
            let ws = p.required_str(tool, "worksheet_id")?;
            let row = p.required_str(tool, "row_id")?;
            let mut call = ApiCall::get(format!("{}/{}/logs", rows_path(&ws), seg(&row)));
            // The API spells this parameter "opeartorIds".
            for id in p.id_list("operator_ids") {
                call = call.query("opeartorIds", id);
            }
            if let Some(field) = p.optional_str("field") {
                call = call.query("field", field);
            }
            let mut call = paged(call, p);
            if let Some(start) = p.optional_str("start_date") {
                call = call.query("startDate", start);
            }
            if let Some(end) = p.optional_str("end_date") {
                call = call.query("endDate", end);
            }
            Ok(call)
        }
        "get_record_relations" => {
            let ws = p.required_str(tool, "worksheet_id")?;
            let row = p.required_str(tool, "row_id")?;
            let field = p.required_str(tool, "field")?;
            let path = format!("{}/{}/relations/{}", rows_path(&ws), seg(&row), seg(&field));
            let mut call = paged(ApiCall::get(path), p);
            if let Some(flag) = p.optional_flag("is_return_system_fields") {
                call = call.query("isReturnSystemFields", flag);
            }
            Ok(call)
        }
        "get_record_share_link" => {
            let ws = p.required_str(tool, "worksheet_id")?;
            let row = p.required_str(tool, "row_id")?;
            let mut body = Map::new();
            let visible = p.id_list("visible_fields");
            if !visible.is_empty() {
                put(&mut body, "visibleFields", visible);
            }
            if let Some(expired_in) = p.optional_i64("expired_in") {
                put(&mut body, "expiredIn", expired_in);
            }
            if let Some(password) = p.optional_str("password") {
                put(&mut body, "password", password);
            }
            let path = format!("{}/{}/share-link", rows_path(&ws), seg(&row));
            Ok(ApiCall::post(path).body(body))
        }
        "get_record_pivot" => record_pivot(tool, p),
        "list_optionsets" => Ok(ApiCall::get("/v3/app/optionsets")),
        "create_optionset" => {
            let name = p.required_str(tool, "name")?;
            let options = p.required_array(tool, "options")?;
            let enable_color = p.required_str(tool, "enable_color")?;
            let enable_score = p.required_str(tool, "enable_score")?;
            let mut body = Map::new();
            put(&mut body, "name", name);
            put(&mut body, "options", options);
            put(&mut body, "enableColor", is_truthy(&enable_color));
            put(&mut body, "enableScore", is_truthy(&enable_score));
            Ok(ApiCall::post("/v3/app/optionsets").body(body))
        }
        "delete_optionset" => {
            let id = p.required_str(tool, "optionset_id")?;
            Ok(ApiCall::delete(format!("/v3/app/optionsets/{}", seg(&id))))
        }
        "get_role" => {
            let id = p.required_str(tool, "role_id")?;
            Ok(ApiCall::get(format!("/v3/app/roles/{}", seg(&id))))
        }
        "create_role" => create_role(tool, p),
        "add_role_members" => add_role_members(tool, p),
        "remove_role_members" => {
            let id = p.required_str(tool, "role_id")?;
            let operator = p.required_str(tool, "operator_id")?;
            let mut body = Map::new();
            put(&mut body, "operatorId", operator);
            for (param, key) in [
                ("account_ids", "accountIds"),
                ("department_ids", "departmentIds"),
                ("department_tree_ids", "departmentTreeIds"),
                ("job_ids", "jobIds"),
                ("org_role_ids", "orgRoleIds"),
            ] {
                put(&mut body, key, p.id_list(param));
            }
            Ok(ApiCall::delete(format!("/v3/app/roles/{}/members", seg(&id))).body(body))
        }
        "user_leave_all_roles" => {
            let user = p.required_str(tool, "user_id")?;
            Ok(ApiCall::delete(format!("/v3/app/roles/users/{}", seg(&user))))
        }
        "get_workflow" => {
            let id = p.required_str(tool, "process_id")?;
            Ok(ApiCall::get(format!("/v3/app/workflow/processes/{}", seg(&id))))
        }
        "trigger_workflow" => {
            let id = p.required_str(tool, "process_id")?;
            let inputs = p
                .json_object(tool, "inputs")?
                .ok_or_else(|| ToolError::invalid(tool, "Missing parameter: inputs"))?;
            Ok(ApiCall::post(format!("/v3/app/workflow/hooks/{}", seg(&id))).body(inputs))
        }
        "find_department" => {
            let mut call = ApiCall::get("/v3/departments/lookup");
            if let Some(name) = p.optional_str("name") {
                call = call.query("name", name);
            }
            Ok(call)
        }
        "get_regions" => {
            let mut call = ApiCall::get("/v3/regions");
            if let Some(id) = p.optional_str("id") {
                call = call.query("id", id);
            }
            if let Some(search) = p.optional_str("search") {
                call = call.query("search", search);
            }
            Ok(call)
        }
        _ => Err(ToolError::UnknownTool {
            plugin_id: PLUGIN_ID.into(),
            tool_name: tool.to_string(),
        }),
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Append `pageIndex`/`pageSize` query parameters when given.
fn paged(mut call: ApiCall, p: &Params) -> ApiCall {
    if let Some(index) = p.optional_i64("page_index") {
        call = call.query("pageIndex", index);
    }
    if let Some(size) = p.optional_i64("page_size") {
        call = call.query("pageSize", size);
    }
    call
}

fn create_worksheet(tool: &str, p: &Params) -> Result<ApiCall> {
    let name = p.required_str(tool, "name")?;
    let fields = p.required_array(tool, "fields")?;
    if fields.is_empty() {
        return Err(ToolError::invalid(
            tool,
            "Invalid parameter: fields must be a non-empty JSON array",
        ));
    }

    let mut body = Map::new();
    put(&mut body, "name", name);
    put(&mut body, "fields", fields);
    if let Some(alias) = p.optional_str("alias") {
        put(&mut body, "alias", alias);
    }
    if let Some(section) = p.optional_str("section_id") {
        put(&mut body, "sectionId", section);
    }
    Ok(ApiCall::post("/v3/app/worksheets").body(body))
}

fn update_worksheet(tool: &str, p: &Params) -> Result<ApiCall> {
    let ws = p.required_str(tool, "worksheet_id")?;

    let mut body = Map::new();
    for (param, key) in [("name", "name"), ("alias", "alias"), ("section_id", "sectionId")] {
        if let Some(value) = p.optional_str(param) {
            put(&mut body, key, value);
        }
    }
    for (param, key) in [
        ("add_fields", "addFields"),
        ("edit_fields", "editFields"),
        ("remove_fields", "removeFields"),
    ] {
        if let Some(items) = p.json_array(tool, param)? {
            put(&mut body, key, items);
        }
    }

    if body.is_empty() {
        return Err(ToolError::invalid(
            tool,
            "No changes provided: set at least one of name, alias, section_id, add_fields, edit_fields, remove_fields",
        ));
    }
    Ok(ApiCall::post(format!("/v3/app/worksheets/{}", seg(&ws))).body(body))
}

fn list_records(tool: &str, p: &Params) -> Result<ApiCall> {
    let ws = p.required_str(tool, "worksheet_id")?;
    let page_size = p.i64_or("page_size", 50).clamp(1, MAX_PAGE_SIZE);
    let page_index = p.i64_or("page_index", 1).max(1);

    let mut body = Map::new();
    put(&mut body, "pageSize", page_size);
    put(&mut body, "pageIndex", page_index);
    put(&mut body, "includeTotalCount", true);
    put(&mut body, "useFieldIdAsKey", true);
    put(&mut body, "tableView", true);
    if let Some(view) = p.optional_str("view_id") {
        put(&mut body, "viewId", view);
    }
    let fields = p.id_list("field_ids");
    if !fields.is_empty() {
        put(&mut body, "fields", fields);
    }
    if let Some(filter) = p.json_value(tool, "filter")? {
        put(&mut body, "filter", filter);
    }
    if let Some(sorts) = p.json_array(tool, "sorts")? {
        put(&mut body, "sorts", sorts);
    }
    if let Some(search) = p.optional_str("search") {
        put(&mut body, "search", search);
    }
    if let Some(flag) = p.optional_flag("include_system_fields") {
        put(&mut body, "includeSystemFields", flag);
    }
    Ok(ApiCall::post(format!("{}/list", rows_path(&ws))).body(body))
}

fn update_record(tool: &str, p: &Params) -> Result<ApiCall> {
    let ws = p.required_str(tool, "worksheet_id")?;
    let row = p.required_str(tool, "row_id")?;
    let values = p
        .json_object(tool, "body")?
        .ok_or_else(|| ToolError::invalid(tool, "Missing or invalid parameter: body"))?;
    if values.is_empty() {
        return Err(ToolError::invalid(
            tool,
            "Body must be a non-empty JSON object of {fieldId/alias: value}",
        ));
    }

    let fields: Vec<Value> = values
        .into_iter()
        .map(|(id, value)| json!({ "id": id, "value": value }))
        .collect();
    let mut body = Map::new();
    put(&mut body, "fields", fields);
    put(&mut body, "triggerWorkflow", trigger_workflow(p));
    Ok(ApiCall::patch(format!("{}/{}", rows_path(&ws), seg(&row))).body(body))
}

fn record_pivot(tool: &str, p: &Params) -> Result<ApiCall> {
    let ws = p.required_str(tool, "worksheet_id")?;
    let values = p.required_array(tool, "values")?;

    let mut body = Map::new();
    put(&mut body, "values", values);
    for name in ["columns", "rows", "filter", "sorts"] {
        if let Some(value) = p.json_value(tool, name)? {
            put(&mut body, name, value);
        }
    }
    if let Some(view) = p.optional_str("view_id") {
        put(&mut body, "viewId", view);
    }
    if let Some(index) = p.optional_i64("page_index") {
        put(&mut body, "pageIndex", index);
    }
    if let Some(size) = p.optional_i64("page_size") {
        if size > MAX_PAGE_SIZE {
            return Err(ToolError::invalid(tool, "page_size cannot exceed 1000"));
        }
        put(&mut body, "pageSize", size);
    }
    if let Some(flag) = p.optional_flag("include_summary") {
        put(&mut body, "includeSummary", flag);
    }
    Ok(ApiCall::post(format!("{}/pivot", rows_path(&ws))).body(body))
}

fn create_role(tool: &str, p: &Params) -> Result<ApiCall> {
    let name = p.required_str(tool, "name")?;
    let description = p.required_str(tool, "description")?;
    let scope = p.required_str(tool, "permission_scope")?;

    let mut body = Map::new();
    put(&mut body, "name", name);
    put(&mut body, "description", description);
    put(&mut body, "permissionScope", scope);
    put(
        &mut body,
        "type",
        p.optional_str("role_type").unwrap_or_else(|| "0".into()),
    );
    if let Some(hide) = p.optional_str("hide_app_for_members") {
        put(&mut body, "hideAppForMembers", hide.to_lowercase());
    }
    for (param, key) in [
        ("global_permissions", "globalPermissions"),
        ("worksheet_permissions", "worksheetPermissions"),
        ("page_permissions", "pagePermissions"),
    ] {
        if let Some(value) = p.json_value(tool, param)? {
            put(&mut body, key, value);
        }
    }
    Ok(ApiCall::post("/v3/app/roles").body(body))
}

fn add_role_members(tool: &str, p: &Params) -> Result<ApiCall> {
    let id = p.required_str(tool, "role_id")?;

    let mut body = Map::new();
    for (param, key) in [
        ("user_ids", "userIds"),
        ("department_ids", "departmentIds"),
        ("department_tree_ids", "departmentTreeIds"),
        ("job_ids", "jobIds"),
        ("org_role_ids", "orgRoleIds"),
    ] {
        let ids = p.id_list(param);
        if !ids.is_empty() {
            put(&mut body, key, ids);
        }
    }
    if body.is_empty() {
        return Err(ToolError::invalid(
            tool,
            "At least one member type must be specified",
        ));
    }
    Ok(ApiCall::post(format!("/v3/app/roles/{}/members", seg(&id))).body(body))
}

// ---------------------------------------------------------------------------
// Response shaping
// ---------------------------------------------------------------------------

/// Post-process the response of the few tools that reshape it.
fn shape_response(tool: &str, p: &Params, mut response: Value) -> Value {
    match tool {
        "list_records" => {
            let as_table = p
                .optional_str("result_type")
                .is_some_and(|t| t.eq_ignore_ascii_case("table"));
            if as_table && response["success"] == true {
                return json!({
                    "success": true,
                    "data": records_table(&response["data"]),
                });
            }
            response
        }
        "get_app_info" => {
            if response["success"] == true
                && let Some(sections) = response
                    .pointer_mut("/data/sections")
                    .and_then(Value::as_array_mut)
            {
                label_section_types(sections);
            }
            response
        }
        _ => response,
    }
}

/// Replace numeric section item types with their names, recursing into
/// `childSections`.
fn label_section_types(sections: &mut [Value]) {
    for section in sections {
        if let Some(items) = section.get_mut("items").and_then(Value::as_array_mut) {
            for item in items {
                let label = match item.get("type").and_then(Value::as_i64) {
                    Some(0) => "worksheet",
                    Some(1) => "custompage",
                    Some(2) => "group",
                    _ => continue,
                };
                item["type"] = json!(label);
            }
        }
        if let Some(children) = section
            .get_mut("childSections")
            .and_then(Value::as_array_mut)
        {
            label_section_types(children);
        }
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "&#124;").replace('\n', " ")
}

/// Render `data.rows` (or `data.list`) as a pipe table with `id` first.
fn records_table(data: &Value) -> String {
    let rows: Vec<&Map<String, Value>> = ["rows", "list"]
        .iter()
        .find_map(|key| {
            data.get(*key)
                .and_then(Value::as_array)
                .filter(|items| !items.is_empty())
        })
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default();
    let total = data.get("total").and_then(Value::as_i64);

    let Some(first) = rows.first() else {
        return format!("Found {} rows.\n\n|id|\n|---|", total.unwrap_or(0));
    };

    let columns: Vec<&str> = std::iter::once("id")
        .chain(first.keys().map(String::as_str).filter(|k| *k != "id"))
        .collect();
    let header = format!(
        "|{}|\n|{}|",
        columns
            .iter()
            .map(|c| escape_cell(c))
            .collect::<Vec<_>>()
            .join("|"),
        vec!["---"; columns.len()].join("|")
    );

    let lines: Vec<String> = rows
        .iter()
        .map(|row| {
            let cells: Vec<String> = columns
                .iter()
                .map(|c| {
                    let text = match row.get(*c) {
                        None | Some(Value::Null) => String::new(),
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                    };
                    escape_cell(&text)
                })
                .collect();
            format!("|{}|", cells.join("|"))
        })
        .collect();

    let count = total.unwrap_or(rows.len() as i64);
    format!("Found {count} rows.\n\n{header}\n{}", lines.join("\n"))
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

fn tool(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: description.into(),
        parameters,
    }
}

/// Build the list of tool definitions for the HAP plugin.
fn build_tool_definitions() -> Vec<ToolDefinition> {
    let ws = json!({"type": "string", "description": "Worksheet ID or alias"});
    let row = json!({"type": "string", "description": "Record (row) ID"});
    let page_index = json!({"type": "integer", "description": "Page number, starting at 1"});
    let page_size = json!({"type": "integer", "description": "Records per page (max 1000)"});
    let no_workflow = json!({"type": "boolean", "description": "Skip workflows triggered by this change"});

    vec![
        tool(
            "get_app_info",
            "Get application info: sections, worksheets and custom pages",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        tool(
            "create_worksheet",
            "Create a worksheet with the given fields",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Worksheet name"},
                    "fields": {"type": "string", "description": "JSON array of field definitions"},
                    "alias": {"type": "string", "description": "Worksheet alias"},
                    "section_id": {"type": "string", "description": "Section (group) to place the worksheet in"}
                },
                "required": ["name", "fields"]
            }),
        ),
        tool(
            "update_worksheet",
            "Rename a worksheet or add, edit and remove its fields",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "name": {"type": "string"},
                    "alias": {"type": "string"},
                    "section_id": {"type": "string"},
                    "add_fields": {"type": "string", "description": "JSON array of fields to add"},
                    "edit_fields": {"type": "string", "description": "JSON array of fields to edit"},
                    "remove_fields": {"type": "string", "description": "JSON array of field IDs to remove"}
                },
                "required": ["worksheet_id"]
            }),
        ),
        tool(
            "delete_worksheet",
            "Delete a worksheet",
            json!({"type": "object", "properties": {"worksheet_id": ws}, "required": ["worksheet_id"]}),
        ),
        tool(
            "list_records",
            "List worksheet records with filtering, sorting and paging",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "view_id": {"type": "string", "description": "View ID"},
                    "field_ids": {"type": "string", "description": "JSON array of field IDs to return"},
                    "filter": {"type": "string", "description": "Filter object as JSON"},
                    "sorts": {"type": "string", "description": "JSON array of sort rules"},
                    "search": {"type": "string", "description": "Keyword search"},
                    "page_size": page_size,
                    "page_index": page_index,
                    "include_system_fields": {"type": "boolean"},
                    "result_type": {"type": "string", "enum": ["json", "table"], "description": "Return raw JSON or a Markdown table"}
                },
                "required": ["worksheet_id"]
            }),
        ),
        tool(
            "get_record",
            "Get one record",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "row_id": row,
                    "include_system_fields": {"type": "boolean"}
                },
                "required": ["worksheet_id", "row_id"]
            }),
        ),
        tool(
            "update_record",
            "Update one record",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "row_id": row,
                    "body": {"type": "string", "description": "JSON object mapping field ID or alias to value"},
                    "do_not_trigger_workflow": no_workflow
                },
                "required": ["worksheet_id", "row_id", "body"]
            }),
        ),
        tool(
            "delete_record",
            "Delete one record",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "row_id": row,
                    "permanent": {"type": "boolean", "description": "Delete permanently instead of moving to the recycle bin"},
                    "do_not_trigger_workflow": no_workflow
                },
                "required": ["worksheet_id", "row_id"]
            }),
        ),
        tool(
            "batch_create_records",
            "Create several records at once",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "rows": {"type": "string", "description": "JSON array of records"},
                    "do_not_trigger_workflow": no_workflow
                },
                "required": ["worksheet_id", "rows"]
            }),
        ),
        tool(
            "batch_update_records",
            "Apply the same field values to several records",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "row_ids": {"type": "string", "description": "JSON array or comma-separated record IDs"},
                    "fields": {"type": "string", "description": "JSON array of {id, value}"},
                    "do_not_trigger_workflow": no_workflow
                },
                "required": ["worksheet_id", "row_ids", "fields"]
            }),
        ),
        tool(
            "batch_delete_records",
            "Delete several records at once",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "row_ids": {"type": "string", "description": "JSON array or comma-separated record IDs"},
                    "permanent": {"type": "boolean"},
                    "do_not_trigger_workflow": no_workflow
                },
                "required": ["worksheet_id", "row_ids"]
            }),
        ),
        tool(
            "get_record_discussions",
            "List the discussion thread of a record",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "row_id": row,
                    "page_index": page_index,
                    "page_size": page_size,
                    "search": {"type": "string"},
                    "only_with_attachments": {"type": "boolean"}
                },
                "required": ["worksheet_id", "row_id"]
            }),
        ),
        tool(
            "get_record_logs",
            "List the change log of a record",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "row_id": row,
                    "operator_ids": {"type": "string", "description": "Comma-separated operator account IDs"},
                    "field": {"type": "string", "description": "Only changes to this field"},
                    "page_index": page_index,
                    "page_size": page_size,
                    "start_date": {"type": "string"},
                    "end_date": {"type": "string"}
                },
                "required": ["worksheet_id", "row_id"]
            }),
        ),
        tool(
            "get_record_relations",
            "List records linked to a record through a relation field",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "row_id": row,
                    "field": {"type": "string", "description": "Relation field ID"},
                    "page_index": page_index,
                    "page_size": page_size,
                    "is_return_system_fields": {"type": "boolean"}
                },
                "required": ["worksheet_id", "row_id", "field"]
            }),
        ),
        tool(
            "get_record_share_link",
            "Create a share link for a record",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "row_id": row,
                    "visible_fields": {"type": "string", "description": "Field IDs visible through the link"},
                    "expired_in": {"type": "integer", "description": "Link lifetime in seconds"},
                    "password": {"type": "string"}
                },
                "required": ["worksheet_id", "row_id"]
            }),
        ),
        tool(
            "get_record_pivot",
            "Aggregate records into a pivot table",
            json!({
                "type": "object",
                "properties": {
                    "worksheet_id": ws,
                    "values": {"type": "string", "description": "JSON array of value (aggregation) definitions"},
                    "columns": {"type": "string"},
                    "rows": {"type": "string"},
                    "filter": {"type": "string"},
                    "sorts": {"type": "string"},
                    "view_id": {"type": "string"},
                    "page_index": page_index,
                    "page_size": page_size,
                    "include_summary": {"type": "boolean"}
                },
                "required": ["worksheet_id", "values"]
            }),
        ),
        tool(
            "list_optionsets",
            "List the application's option sets",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        tool(
            "create_optionset",
            "Create an option set",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "options": {"type": "string", "description": "JSON array of options"},
                    "enable_color": {"type": "boolean"},
                    "enable_score": {"type": "boolean"}
                },
                "required": ["name", "options", "enable_color", "enable_score"]
            }),
        ),
        tool(
            "delete_optionset",
            "Delete an option set",
            json!({"type": "object", "properties": {"optionset_id": {"type": "string"}}, "required": ["optionset_id"]}),
        ),
        tool(
            "get_role",
            "Get role details",
            json!({"type": "object", "properties": {"role_id": {"type": "string"}}, "required": ["role_id"]}),
        ),
        tool(
            "create_role",
            "Create a role",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "permission_scope": {"type": "string"},
                    "role_type": {"type": "string", "description": "Role type (default 0)"},
                    "hide_app_for_members": {"type": "boolean"},
                    "global_permissions": {"type": "string", "description": "JSON"},
                    "worksheet_permissions": {"type": "string", "description": "JSON"},
                    "page_permissions": {"type": "string", "description": "JSON"}
                },
                "required": ["name", "description", "permission_scope"]
            }),
        ),
        tool(
            "add_role_members",
            "Add users, departments, jobs or org roles to a role",
            json!({
                "type": "object",
                "properties": {
                    "role_id": {"type": "string"},
                    "user_ids": {"type": "string"},
                    "department_ids": {"type": "string"},
                    "department_tree_ids": {"type": "string"},
                    "job_ids": {"type": "string"},
                    "org_role_ids": {"type": "string"}
                },
                "required": ["role_id"]
            }),
        ),
        tool(
            "remove_role_members",
            "Remove members from a role",
            json!({
                "type": "object",
                "properties": {
                    "role_id": {"type": "string"},
                    "operator_id": {"type": "string", "description": "Account performing the removal"},
                    "account_ids": {"type": "string"},
                    "department_ids": {"type": "string"},
                    "department_tree_ids": {"type": "string"},
                    "job_ids": {"type": "string"},
                    "org_role_ids": {"type": "string"}
                },
                "required": ["role_id", "operator_id"]
            }),
        ),
        tool(
            "user_leave_all_roles",
            "Remove a user from every role of the application",
            json!({"type": "object", "properties": {"user_id": {"type": "string"}}, "required": ["user_id"]}),
        ),
        tool(
            "get_workflow",
            "Get workflow process details",
            json!({"type": "object", "properties": {"process_id": {"type": "string"}}, "required": ["process_id"]}),
        ),
        tool(
            "trigger_workflow",
            "Trigger a webhook workflow",
            json!({
                "type": "object",
                "properties": {
                    "process_id": {"type": "string"},
                    "inputs": {"type": "string", "description": "JSON object of workflow inputs"}
                },
                "required": ["process_id", "inputs"]
            }),
        ),
        tool(
            "find_department",
            "Look up departments by name",
            json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": []}),
        ),
        tool(
            "get_regions",
            "Look up administrative regions",
            json!({
                "type": "object",
                "properties": {"id": {"type": "string"}, "search": {"type": "string"}},
                "required": []
            }),
        ),
    ]
}

// ---------------------------------------------------------------------------
// Plugin trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialValidator for HapPlugin {
    async fn validate(
        &self,
        credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError> {
        let creds = HapCredentials::from_map(credentials)?;
        let call = ApiCall::get("/v3/app");
        let body = self
            .http
            .probe_json(PLUGIN_ID, self.request(&creds, &call))
            .await?;

        if body["success"] != true {
            return Err(CredentialValidationError::Rejected {
                provider: PLUGIN_ID.into(),
                reason: format!("Test connection failed: {body}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RequestHandler for HapPlugin {
    fn tools(&self) -> Vec<ToolDefinition> {
        build_tool_definitions()
    }

    async fn handle(
        &self,
        tool: &str,
        params: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        let call = plan(tool, params)?;
        let creds = HapCredentials::from_map(credentials)?;
        let response = self
            .http
            .send_json(tool, self.request(&creds, &call))
            .await?;
        Ok(vec![ToolMessage::json(shape_response(tool, params, response))])
    }

    fn render_error(&self, error: &ToolError) -> ToolMessage {
        match error {
            ToolError::InvalidParams { reason, .. } => ToolMessage::json(json!({ "error": reason })),
            other => ToolMessage::json(json!({
                "success": false,
                "error_msg": format!("Request failed: {}", other.detail()),
                "error_kind": other.kind(),
            })),
        }
    }
}

impl Plugin for HapPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "HAP (Mingdao) worksheets, records, roles and workflows"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
