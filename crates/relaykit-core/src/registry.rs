//! Static plugin registry.
//!
//! Plugins are registered from a fixed table of constructors rather than
//! discovered at runtime.  The registry routes a validation or an invocation
//! to exactly one plugin; unknown plugins and tools are routing errors, not
//! tool output.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = PluginRegistry::from_table(BUILTIN, &HttpSettings::default());
//! registry.validate("hackernews", &CredentialMap::new()).await?;
//! let messages = registry
//!     .invoke("hackernews", "get_user_info", &params, &CredentialMap::new())
//!     .await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::HttpSettings;
use crate::credentials::CredentialMap;
use crate::error::RegistryError;
use crate::message::ToolMessage;
use crate::params::Params;
use crate::traits::{Plugin, invoke};

/// Constructor entry in a static plugin table.
pub type PluginFactory = fn(&HttpSettings) -> Arc<dyn Plugin>;

/// Plugins keyed by id.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a static table of constructors.
    pub fn from_table(table: &[PluginFactory], settings: &HttpSettings) -> Self {
        let mut registry = Self::new();
        for factory in table {
            registry.register(factory(settings));
        }
        registry
    }

    /// Register a plugin, replacing any plugin with the same id.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let id = plugin.id().to_string();
        debug!(plugin_id = %id, tools = plugin.tools().len(), "plugin registered");
        self.plugins.insert(id, plugin);
    }

    /// Look up a plugin by id.
    pub fn get(&self, plugin_id: &str) -> Result<&Arc<dyn Plugin>, RegistryError> {
        self.plugins
            .get(plugin_id)
            .ok_or_else(|| RegistryError::PluginNotFound {
                plugin_id: plugin_id.to_string(),
            })
    }

    /// Registered plugin ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// Registered plugins in id order.
    pub fn plugins(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.values()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Run the provider check of one plugin.
    pub async fn validate(
        &self,
        plugin_id: &str,
        credentials: &CredentialMap,
    ) -> Result<(), RegistryError> {
        let plugin = self.get(plugin_id)?;
        plugin.validate(credentials).await?;
        info!(plugin_id, "credentials validated");
        Ok(())
    }

    /// Route one invocation to one tool.  Tool failures come back as
    /// messages; only routing failures are errors.
    pub async fn invoke(
        &self,
        plugin_id: &str,
        tool: &str,
        params: &Params,
        credentials: &CredentialMap,
    ) -> Result<Vec<ToolMessage>, RegistryError> {
        let plugin = self.get(plugin_id)?;
        if !plugin.has_tool(tool) {
            return Err(RegistryError::ToolNotFound {
                plugin_id: plugin_id.to_string(),
                tool_name: tool.to_string(),
            });
        }
        debug!(plugin_id, tool, "invoking tool");
        Ok(invoke(plugin.as_ref(), tool, params, credentials).await)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
