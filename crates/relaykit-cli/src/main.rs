//! CLI entry point for RelayKit.
//!
//! This binary provides the `relaykit` command: list the bundled plugins,
//! validate a plugin's configured credentials, or invoke a single tool.

mod cli;
mod helpers;

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use relaykit_core::{RelayConfig, ToolMessage};
use serde_json::json;
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::helpers::{init_tracing, parse_params};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = dotenvy::dotenv() {
        // A missing .env file is normal.
        if !e.not_found() {
            eprintln!("warning: failed to load .env: {e}");
        }
    }
    init_tracing("info", cli.log_json);

    let config = RelayConfig::load_with_env(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    debug!(path = %cli.config.display(), plugins = config.credentials.len(), "configuration loaded");

    match cli.command {
        Commands::Plugins => cmd_plugins(&config),
        Commands::Validate { plugin } => cmd_validate(&config, &plugin).await,
        Commands::Invoke {
            plugin,
            tool,
            params,
            param,
        } => cmd_invoke(&config, &plugin, &tool, params.as_deref(), &param).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: plugins
// ---------------------------------------------------------------------------

fn cmd_plugins(config: &RelayConfig) -> Result<()> {
    let registry = relaykit_adapters::builtin_registry(&config.http);
    let mut out = io::stdout().lock();
    for plugin in registry.plugins() {
        let tools: Vec<_> = plugin
            .tools()
            .into_iter()
            .map(|t| json!({"name": t.name, "description": t.description}))
            .collect();
        let line = json!({
            "id": plugin.id(),
            "description": plugin.description(),
            "tools": tools,
        });
        writeln!(out, "{line}").context("failed to write to stdout")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: validate
// ---------------------------------------------------------------------------

async fn cmd_validate(config: &RelayConfig, plugin_id: &str) -> Result<()> {
    let registry = relaykit_adapters::builtin_registry(&config.http);
    let credentials = config.credentials_for(plugin_id);

    registry
        .validate(plugin_id, &credentials)
        .await
        .with_context(|| format!("credential validation failed for `{plugin_id}`"))?;

    info!(plugin_id, "credentials accepted");
    println!("{}", json!({"plugin": plugin_id, "valid": true}));
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: invoke
// ---------------------------------------------------------------------------

async fn cmd_invoke(
    config: &RelayConfig,
    plugin_id: &str,
    tool: &str,
    params_json: Option<&str>,
    pairs: &[String],
) -> Result<()> {
    let params = parse_params(params_json, pairs)?;
    let registry = relaykit_adapters::builtin_registry(&config.http);
    let credentials = config.credentials_for(plugin_id);

    let messages = registry
        .invoke(plugin_id, tool, &params, &credentials)
        .await
        .context("invocation failed")?;

    print_messages(&messages)
}

/// Write each message as one JSON object per line.
fn print_messages(messages: &[ToolMessage]) -> Result<()> {
    let mut out = io::stdout().lock();
    for message in messages {
        let line = serde_json::to_string(message).context("failed to encode message")?;
        writeln!(out, "{line}").context("failed to write to stdout")?;
    }
    Ok(())
}
