//! Per-call credential map.
//!
//! The host hands every validation and invocation a fresh set of string
//! credentials.  Values are wrapped in [`SecretString`] so they never show up
//! in `Debug` output or logs; each plugin turns the map into its own typed
//! configuration struct before using it.

use std::collections::BTreeMap;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::CredentialValidationError;

/// String keys mapped to secret values, supplied fresh per call.
#[derive(Clone, Default, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct CredentialMap {
    entries: BTreeMap<String, SecretString>,
}

impl CredentialMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert(key.into(), SecretString::from(value.into()));
    }

    /// Builder-style [`CredentialMap::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Return the trimmed value for `key`, treating blank values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(|v| v.expose_secret().trim())
            .filter(|v| !v.is_empty())
    }

    /// Like [`CredentialMap::get`] but a missing value is an error.
    pub fn require(&self, key: &str) -> Result<&str, CredentialValidationError> {
        self.get(key).ok_or_else(|| CredentialValidationError::Missing {
            key: key.to_string(),
        })
    }

    /// Iterate over the keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no credentials were supplied.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CredentialMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialMap")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl From<BTreeMap<String, String>> for CredentialMap {
    fn from(raw: BTreeMap<String, String>) -> Self {
        raw.into_iter().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for CredentialMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
