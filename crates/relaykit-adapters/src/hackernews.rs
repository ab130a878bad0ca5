//! Hacker News plugin backed by the public Firebase API.
//!
//! No credentials are needed; the provider only checks that the API is
//! reachable.  Tools answer with a formatted text message followed by the
//! structured JSON, and report every failure as plain text.

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{Value, json};

use crate::html::strip_html;
use relaykit_core::{
    CredentialMap, CredentialValidationError, CredentialValidator, HttpClient, HttpSettings,
    Params, Plugin, RequestHandler, Result, ToolDefinition, ToolError, ToolMessage,
};

/// Default Hacker News API base URL.
const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";

const TIMEOUT_SECS: u64 = 10;

const PLUGIN_ID: &str = "hackernews";

/// Most story ids a single call returns.
const MAX_STORIES: i64 = 30;

/// Story list endpoints, keyed by the `story_type` parameter.
const STORY_TYPES: [&str; 6] = ["top", "new", "best", "ask", "show", "job"];

/// Item types `get_story_info` accepts.
const STORY_ITEM_TYPES: [&str; 3] = ["story", "job", "poll"];

/// Format a Unix timestamp as `YYYY-MM-DD HH:MM:SS` (UTC).
fn format_timestamp(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_i64)
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Hacker News plugin.
pub struct HackerNewsPlugin {
    http: HttpClient,
    base_url: String,
}

impl HackerNewsPlugin {
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

    fn api_url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn get(&self, tool: &str, path: &str) -> Result<Value> {
        let request = self.http.client().get(self.api_url(path));
        self.http.send_json(tool, request).await
    }

    // -----------------------------------------------------------------------
    // Tool implementations
    // -----------------------------------------------------------------------

    /// Fetch the ids of the current top/new/best/ask/show/job stories.
    async fn tool_get_top_stories(&self, tool: &str, p: &Params) -> Result<Vec<ToolMessage>> {
        let limit = match p.get("limit") {
            None => 10,
            Some(_) => p
                .optional_i64("limit")
                .ok_or_else(|| ToolError::invalid(tool, "Limit must be a valid number"))?,
        };
        if !(1..=MAX_STORIES).contains(&limit) {
            return Err(ToolError::invalid(tool, "Limit must be between 1 and 30"));
        }
        let story_type = p
            .optional_str("story_type")
            .map(|t| t.to_ascii_lowercase())
            .filter(|t| STORY_TYPES.contains(&t.as_str()))
            .unwrap_or_else(|| "top".to_string());

        let response = self.get(tool, &format!("{story_type}stories.json")).await?;
        let ids: Vec<Value> = response
            .as_array()
            .map(|ids| ids.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default();

        if ids.is_empty() {
            return Ok(vec![ToolMessage::text("No stories found")]);
        }

        let listed: Vec<String> = ids.iter().map(Value::to_string).collect();
        let text = format!(
            "**Hacker News {story_type} stories ({})**\n\n{}",
            ids.len(),
            listed.join(", ")
        );
        Ok(vec![
            ToolMessage::text(text),
            ToolMessage::json(json!({
                "story_type": story_type,
                "count": ids.len(),
                "story_ids": ids,
            })),
        ])
    }

    /// Fetch one story, job or poll.
    async fn tool_get_story_info(&self, tool: &str, p: &Params) -> Result<Vec<ToolMessage>> {
        let raw_id = p
            .optional_str("story_id")
            .ok_or_else(|| ToolError::invalid(tool, "Story ID is required"))?;
        let story_id: u64 = raw_id
            .parse()
            .map_err(|_| ToolError::invalid(tool, "Story ID must be a valid number"))?;

        let story = self.get(tool, &format!("item/{story_id}.json")).await?;
        if story.is_null() {
            return Ok(vec![ToolMessage::text(format!(
                "Story with ID {story_id} not found"
            ))]);
        }

        let item_type = story["type"].as_str().unwrap_or("unknown");
        if !STORY_ITEM_TYPES.contains(&item_type) {
            return Ok(vec![ToolMessage::text(format!(
                "Item {story_id} is not a story (type: {item_type})"
            ))]);
        }

        let text = story["text"].as_str().unwrap_or_default();
        let url = story["url"].as_str().unwrap_or_default();
        let info = json!({
            "id": story["id"],
            "title": story["title"].as_str().unwrap_or("No title"),
            "author": story["by"].as_str().unwrap_or("Unknown"),
            "score": story["score"].as_i64().unwrap_or(0),
            "time": story["time"],
            "created": format_timestamp(story.get("time")),
            "url": url,
            "text": text,
            "content": strip_html(text),
            "type": item_type,
            "descendants": story["descendants"].as_i64().unwrap_or(0),
            "kids": story.get("kids").cloned().unwrap_or_else(|| json!([])),
        });

        let content = info["content"].as_str().unwrap_or_default();
        let summary = format!(
            "**{title}**\n\n**Story Details:**\n- ID: {id}\n- Author: {author}\n- Score: {score} points\n- Comments: {comments}\n- Posted: {created}\n- Type: {item_type}\n\n**URL:** {url}\n\n**Content:**\n{content}\n",
            title = info["title"].as_str().unwrap_or_default(),
            id = info["id"],
            author = info["author"].as_str().unwrap_or_default(),
            score = info["score"],
            comments = info["descendants"],
            created = info["created"].as_str().unwrap_or_default(),
            url = if url.is_empty() { "No external URL" } else { url },
            content = if content.is_empty() {
                "No content available"
            } else {
                content
            },
        );
        Ok(vec![ToolMessage::text(summary), ToolMessage::json(info)])
    }

    /// Fetch a user profile.
    async fn tool_get_user_info(&self, tool: &str, p: &Params) -> Result<Vec<ToolMessage>> {
        let username = p
            .optional_str("username")
            .ok_or_else(|| ToolError::invalid(tool, "Username is required"))?;
        let not_found = || {
            Ok(vec![ToolMessage::text(format!(
                "User '{username}' not found on Hacker News"
            ))])
        };

        let path = format!("user/{}.json", urlencoding::encode(&username));
        let user = match self.get(tool, &path).await {
            Ok(user) => user,
            Err(ToolError::Upstream { status: 404, .. }) => return not_found(),
            Err(e) => return Err(e),
        };
        if user.is_null() {
            return not_found();
        }

        let submitted = user["submitted"].as_array().cloned().unwrap_or_default();
        let recent: Vec<Value> = submitted.iter().take(10).cloned().collect();
        let info = json!({
            "username": user["id"].as_str().unwrap_or("N/A"),
            "created": user["created"],
            "karma": user["karma"].as_i64().unwrap_or(0),
            "about": user["about"].as_str().unwrap_or("No bio available"),
            "submitted_count": submitted.len(),
            "submitted_items": recent,
        });

        let recent_text = if recent.is_empty() {
            "None".to_string()
        } else {
            recent
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let summary = format!(
            "**Hacker News User: {name}**\n\n**Account Info:**\n- Created: {created}\n- Karma: {karma}\n- Total Submissions: {count}\n\n**About:**\n{about}\n\n**Recent Submissions (Item IDs):**\n{recent_text}\n",
            name = info["username"].as_str().unwrap_or_default(),
            created = format_timestamp(user.get("created")),
            karma = info["karma"],
            count = submitted.len(),
            about = strip_html(info["about"].as_str().unwrap_or_default()),
        );
        Ok(vec![ToolMessage::text(summary), ToolMessage::json(info)])
    }
}

/// Noun used in "Failed to fetch ..." messages.
fn fetch_subject(tool: &str) -> &'static str {
    match tool {
        "get_top_stories" => "stories",
        "get_story_info" => "story",
        _ => "user info",
    }
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

fn build_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_top_stories".into(),
            description: "List the ids of current Hacker News stories by category".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "story_type": {
                        "type": "string",
                        "enum": STORY_TYPES,
                        "description": "Story list (default: top)"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Number of stories, 1-30 (default: 10)"
                    }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "get_story_info".into(),
            description: "Get a story, job or poll by id".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "story_id": {"type": "string", "description": "Numeric item id"}
                },
                "required": ["story_id"]
            }),
        },
        ToolDefinition {
            name: "get_user_info".into(),
            description: "Get a Hacker News user profile".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "username": {"type": "string", "description": "Case-sensitive username"}
                },
                "required": ["username"]
            }),
        },
    ]
}

// ---------------------------------------------------------------------------
// Plugin trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialValidator for HackerNewsPlugin {
    async fn validate(
        &self,
        _credentials: &CredentialMap,
    ) -> std::result::Result<(), CredentialValidationError> {
        let request = self.http.client().get(self.api_url("topstories.json"));
        match self.http.probe(PLUGIN_ID, request).await {
            Ok(_) => Ok(()),
            Err(CredentialValidationError::Rejected { provider, .. }) => {
                Err(CredentialValidationError::Rejected {
                    provider,
                    reason: "Unable to access Hacker News API".into(),
                })
            }
            Err(CredentialValidationError::Unreachable { provider, reason }) => {
                Err(CredentialValidationError::Unreachable {
                    provider,
                    reason: format!("Failed to connect to Hacker News API: {reason}"),
                })
            }
            Err(other) => Err(other),
        }
    }
}

#[async_trait]
impl RequestHandler for HackerNewsPlugin {
    fn tools(&self) -> Vec<ToolDefinition> {
        build_tool_definitions()
    }

    async fn handle(
        &self,
        tool: &str,
        params: &Params,
        _credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>> {
        match tool {
            "get_top_stories" => self.tool_get_top_stories(tool, params).await,
            "get_story_info" => self.tool_get_story_info(tool, params).await,
            "get_user_info" => self.tool_get_user_info(tool, params).await,
            _ => Err(ToolError::UnknownTool {
                plugin_id: PLUGIN_ID.into(),
                tool_name: tool.to_string(),
            }),
        }
    }

    fn render_error(&self, error: &ToolError) -> ToolMessage {
        let text = match error {
            ToolError::InvalidParams { reason, .. } => reason.clone(),
            ToolError::Upstream {
                tool_name, status, ..
            } => format!("Failed to fetch {}. HTTP {status}", fetch_subject(tool_name)),
            ToolError::Transport { reason, .. } => format!("Network error: {reason}"),
            other => format!("An error occurred: {}", other.detail()),
        };
        ToolMessage::text(text)
    }
}

impl Plugin for HackerNewsPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "Hacker News stories and user profiles"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
