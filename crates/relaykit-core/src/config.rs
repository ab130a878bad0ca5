//! RelayKit configuration.
//!
//! Loaded from a TOML file (default `relaykit.toml`) and then overlaid with
//! environment variables:
//!
//! ```toml
//! [http]
//! timeout_secs = 30
//! user_agent = "relaykit/0.1"
//!
//! [credentials.hap]
//! appkey = "..."
//! sign = "..."
//! ```
//!
//! | variable | effect |
//! |---|---|
//! | `RELAYKIT_HTTP_TIMEOUT_SECS` | overrides `http.timeout_secs` |
//! | `RELAYKIT_HTTP_USER_AGENT` | overrides `http.user_agent` |
//! | `RELAYKIT__<PLUGIN>__<KEY>` | sets credential `<key>` of plugin `<plugin>` |
//!
//! A missing file is not an error; the defaults apply.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::credentials::CredentialMap;
use crate::error::ConfigError;
use crate::http::{DEFAULT_USER_AGENT, HttpClient};

/// Prefix for per-plugin credential overrides.
const CREDENTIAL_ENV_PREFIX: &str = "RELAYKIT__";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Settings shared by every plugin's HTTP client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Overrides each plugin's built-in request timeout when set.
    pub timeout_secs: Option<u64>,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpSettings {
    /// Reject a zero timeout, which would fail every request.
    fn check(&self, key: &str) -> Result<(), ConfigError> {
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: "timeout must be at least 1 second".into(),
            });
        }
        Ok(())
    }

    /// Build a client, using `default_timeout` unless an override is set.
    pub fn client(&self, default_timeout: u64) -> HttpClient {
        HttpClient::new(
            self.timeout_secs.unwrap_or(default_timeout),
            &self.user_agent,
        )
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub http: HttpSettings,
    /// Credentials keyed by plugin id.
    pub credentials: BTreeMap<String, CredentialMap>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl RelayConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.http.check("http.timeout_secs")?;
        Ok(config)
    }

    /// [`RelayConfig::load`] followed by the process environment.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env(std::env::vars())?;
        Ok(config)
    }

    /// Apply `RELAYKIT_*` overrides from an iterator of variables.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if let Some(rest) = name.strip_prefix(CREDENTIAL_ENV_PREFIX) {
                let Some((plugin, key)) = rest.split_once("__") else {
                    continue;
                };
                if plugin.is_empty() || key.is_empty() {
                    continue;
                }
                self.credentials
                    .entry(plugin.to_ascii_lowercase())
                    .or_default()
                    .insert(key.to_ascii_lowercase(), value);
                continue;
            }

            match name.as_str() {
                "RELAYKIT_HTTP_TIMEOUT_SECS" => {
                    let secs = value.trim().parse::<u64>().map_err(|e| {
                        ConfigError::InvalidValue {
                            key: name.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    self.http.timeout_secs = Some(secs);
                    self.http.check(&name)?;
                }
                "RELAYKIT_HTTP_USER_AGENT" => self.http.user_agent = value,
                _ => {}
            }
        }
        Ok(())
    }

    /// Credentials configured for `plugin_id` (empty when none).
    pub fn credentials_for(&self, plugin_id: &str) -> CredentialMap {
        self.credentials.get(plugin_id).cloned().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
