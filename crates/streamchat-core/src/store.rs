//! Client-local key/value store backed by a JSON file.
//!
//! Reads fall back to the caller's default and writes are best-effort: a
//! broken or unwritable storage file never takes the client down.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::config_dir;

/// Key under which the proxy access key is stored
pub const ACCESS_KEY: &str = "access_key";
/// Key under which the provider API key is stored (direct mode)
pub const API_KEY: &str = "api_key";

#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<config_dir>/streamchat/storage.json`
    pub fn default_location() -> Result<Self> {
        Ok(Self::open(config_dir()?.join("storage.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `key`, or `default` if it is unset or unreadable.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(key, path = %self.path.display(), error = %e, "error reading storage key");
                return default;
            }
        };

        match entries.get(key) {
            None => default,
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(v) => v,
                Err(e) => {
                    warn!(key, error = %e, "malformed value for storage key");
                    default
                }
            },
        }
    }

    /// Write `key`. Failures are logged and swallowed.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.write_entry(key, value) {
            warn!(key, path = %self.path.display(), error = %e, "error saving storage key");
        }
    }

    /// Read-modify-write of `key`, returning the stored value.
    pub fn update<T, F>(&self, key: &str, default: T, f: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let value = f(self.get(key, default));
        self.set(key, &value);
        value
    }

    fn read_entries(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            other => Err(anyhow!("expected a JSON object, found {}", json_kind(&other))),
        }
    }

    fn write_entry<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        // A corrupt file is replaced rather than blocking every future write.
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(key.to_string(), serde_json::to_value(value)?);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&Value::Object(entries))?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
