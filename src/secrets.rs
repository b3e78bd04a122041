//! Secret lookup.
//!
//! Tasks only ever consume secrets through [`SecretStore::get`]. How secrets
//! are stored or decrypted is up to the implementation.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Source of secret values, addressed by key.
pub trait SecretStore: Send + Sync {
    /// Get the secret stored under `key`.
    fn get(&self, key: &str) -> Result<String>;
}

/// Reads secrets from environment variables.
///
/// The key `db.password` with prefix `SITEFORM_SECRET_` is looked up as
/// `SITEFORM_SECRET_DB_PASSWORD`.
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    /// Default variable prefix
    pub const DEFAULT_PREFIX: &'static str = "SITEFORM_SECRET_";

    /// Create a store reading variables under `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable name for `key`
    pub fn variable_name(&self, key: &str) -> String {
        let suffix: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}

impl SecretStore for EnvSecretStore {
    fn get(&self, key: &str) -> Result<String> {
        let variable = self.variable_name(key);
        std::env::var(&variable)
            .map_err(|e| Error::secret(key, format!("{}: {}", variable, e)))
    }
}

/// In-memory secrets.
#[derive(Default, Clone)]
pub struct MapSecretStore {
    secrets: HashMap<String, String>,
}

impl fmt::Debug for MapSecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.secrets.keys().collect();
        keys.sort();
        f.debug_struct("MapSecretStore").field("keys", &keys).finish()
    }
}

impl MapSecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret
    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }
}

impl SecretStore for MapSecretStore {
    fn get(&self, key: &str) -> Result<String> {
        self.secrets
            .get(key)
            .cloned()
            .ok_or_else(|| Error::secret(key, "no such secret"))
    }
}
