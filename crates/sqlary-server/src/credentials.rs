use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use constant_time_eq::constant_time_eq;
use serde::Deserialize;

/// One user entry in a credentials file. `api_key` is optional — a user can
/// hold valid credentials without a provisioned key.
#[derive(Debug, Deserialize)]
pub struct CredentialEntry {
    pub username: String,
    pub password: String,
    pub api_key: Option<String>,
}

/// Static credential set: username → password and username → API key.
/// Loaded once at process start; there is no runtime mutation.
pub struct Credentials {
    passwords: HashMap<String, String>,
    api_keys: HashMap<String, String>,
}

impl Credentials {
    /// Built-in development credentials. `keyless-user` has valid
    /// credentials but no API key, so the "valid login, no key" path is
    /// reachable out of the box.
    pub fn builtin() -> Self {
        Self::from_entries(vec![
            CredentialEntry {
                username: "stark".into(),
                password: "ironman-3000".into(),
                api_key: Some("sqlary_key_7f8a2c91d4e6b0a3c5f1e9d8b7a6c4d2".into()),
            },
            CredentialEntry {
                username: "wayne".into(),
                password: "alfred-pennyworth".into(),
                api_key: Some("sqlary_key_1b3d5f7a9c0e2a4c6e8b0d2f4a6c8e1f".into()),
            },
            CredentialEntry {
                username: "keyless-user".into(),
                password: "dogatemykeys".into(),
                api_key: None,
            },
        ])
    }

    /// Load credentials from a JSON file holding an array of
    /// `{username, password, api_key?}` entries.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read credentials file: {}", path.display()))?;
        let entries: Vec<CredentialEntry> =
            serde_json::from_str(&content).context("parse credentials file")?;
        Ok(Self::from_entries(entries))
    }

    /// Load from `path` if configured, falling back to the built-in set.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn from_entries(entries: Vec<CredentialEntry>) -> Self {
        let mut passwords = HashMap::new();
        let mut api_keys = HashMap::new();
        for entry in entries {
            if let Some(key) = entry.api_key {
                api_keys.insert(entry.username.clone(), key);
            }
            passwords.insert(entry.username, entry.password);
        }
        Self {
            passwords,
            api_keys,
        }
    }

    /// Constant-time password check. An unknown user or a password of a
    /// different length than the stored one is a non-match, not an error.
    pub fn verify_password(&self, username: &str, password: &str) -> bool {
        match self.passwords.get(username) {
            Some(stored) => constant_time_eq(stored.as_bytes(), password.as_bytes()),
            None => false,
        }
    }

    /// The API key provisioned for `username`, if any.
    pub fn api_key(&self, username: &str) -> Option<&str> {
        self.api_keys.get(username).map(String::as_str)
    }

    /// Whether `token` is a member of the set of issued API keys.
    pub fn is_issued(&self, token: &str) -> bool {
        self.api_keys
            .values()
            .any(|key| constant_time_eq(key.as_bytes(), token.as_bytes()))
    }

    pub fn user_count(&self) -> usize {
        self.passwords.len()
    }

    pub fn key_count(&self) -> usize {
        self.api_keys.len()
    }
}
