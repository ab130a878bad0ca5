//! CLI argument definitions for RelayKit.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// RelayKit -- validate credentials and call service tools from the shell.
#[derive(Parser)]
#[command(
    name = "relaykit",
    version,
    about = "RelayKit -- service plugins for agent hosts",
    long_about = "Runs the bundled service plugins directly: validate a provider's \
                  credentials or invoke one tool and print its output messages as JSON lines."
)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, global = true, env = "RELAYKIT_CONFIG", default_value = "relaykit.toml")]
    pub config: PathBuf,

    /// Emit logs as JSON instead of the compact format.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List plugins and their tools.
    Plugins,

    /// Check the configured credentials of one plugin.
    Validate {
        /// Plugin id, e.g. `hackernews`.
        plugin: String,
    },

    /// Invoke one tool and print its messages, one JSON object per line.
    Invoke {
        /// Plugin id.
        plugin: String,

        /// Tool name.
        tool: String,

        /// Parameters as a JSON object.
        #[arg(long)]
        params: Option<String>,

        /// Single parameter as `key=value`; may be repeated and wins over `--params`.
        #[arg(long = "param", value_name = "KEY=VALUE")]
        param: Vec<String>,
    },
}
