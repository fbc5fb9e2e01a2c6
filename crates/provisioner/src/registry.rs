//! System software registry access.
//!
//! The registry is modeled as a read-only key/value store: a key path plus a
//! value name yields a string, and absence is `None` rather than an error.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::process::Command;
use std::sync::{Arc, RwLock};

/// Read access to the installed-software registry.
pub trait Registry: Send + Sync {
    /// Read `name` under `key`. Missing keys and values are `Ok(None)`.
    fn get_value(&self, key: &str, name: &str) -> Result<Option<String>>;
}

/// Registry backed by the `reg` command-line tool.
#[derive(Debug, Clone, Default)]
pub struct RegCli;

impl RegCli {
    /// Create a new registry reader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Registry for RegCli {
    fn get_value(&self, key: &str, name: &str) -> Result<Option<String>> {
        let output = Command::new("reg")
            .args(["query", key, "/v", name])
            .output()
            .map_err(|e| Error::config(format!("failed to query registry key {key}: {e}")))?;

        if !output.status.success() {
            // reg exits 1 when the key or value does not exist
            if output.status.code() == Some(1) {
                return Ok(None);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::config(format!(
                "reg query {key} /v {name} failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_reg_query(&stdout, name))
    }
}

/// Extract the data of value `name` from `reg query` output.
///
/// Value lines look like `    CurrentVersion    REG_SZ    1.8`.
pub fn parse_reg_query(output: &str, name: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut fields = line.trim_start().splitn(3, "    ");
        let value_name = fields.next()?;
        let value_type = fields.next()?;
        if !value_name.eq_ignore_ascii_case(name) || !value_type.starts_with("REG_") {
            return None;
        }
        Some(fields.next().unwrap_or("").trim().to_string())
    })
}

/// In-memory registry for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    values: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` under `key`. Clones share storage.
    pub fn set(&self, key: &str, name: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert((key.to_ascii_lowercase(), name.to_ascii_lowercase()), value.to_string());
        }
    }
}

impl Registry for MemoryRegistry {
    fn get_value(&self, key: &str, name: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| Error::config("registry lock poisoned"))?;
        Ok(values
            .get(&(key.to_ascii_lowercase(), name.to_ascii_lowercase()))
            .cloned())
    }
}
