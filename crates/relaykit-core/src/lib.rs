//! Core contracts for RelayKit plugins.
//!
//! A plugin pairs a provider ([`CredentialValidator`]) with a set of tools
//! ([`RequestHandler`]).  This crate holds everything the per-service
//! adapters share: output messages, the credential map, parameter helpers,
//! the HTTP wrapper, the Markdown table helper, configuration, and the
//! static [`PluginRegistry`].

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod message;
pub mod params;
pub mod registry;
pub mod table;
pub mod traits;

pub use config::{HttpSettings, RelayConfig};
pub use credentials::CredentialMap;
pub use error::{ConfigError, CredentialValidationError, RegistryError, Result, ToolError};
pub use http::HttpClient;
pub use message::ToolMessage;
pub use params::Params;
pub use registry::{PluginFactory, PluginRegistry};
pub use table::json_to_table;
pub use traits::{CredentialValidator, Plugin, RequestHandler, ToolDefinition, invoke};
