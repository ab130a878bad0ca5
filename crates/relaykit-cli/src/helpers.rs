//! Shared helpers for the CLI subcommands.

use anyhow::{Context, Result, bail};
use relaykit_core::Params;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so that stdout carries only tool output.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Merge `--params` JSON with repeated `--param key=value` pairs.
///
/// A `--param` value is parsed as JSON when it can be, so `limit=5` yields
/// a number and `name=alice` a string.
pub fn parse_params(json: Option<&str>, pairs: &[String]) -> Result<Params> {
    let mut params = match json {
        None => Params::new(),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw).context("--params is not valid JSON")?;
            if !value.is_object() {
                bail!("--params must be a JSON object");
            }
            Params::from_value(value)
        }
    };

    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("--param expects KEY=VALUE, got `{pair}`");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("--param has an empty key: `{pair}`");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        params.insert(key, value);
    }
    Ok(params)
}
