//! Node settings.
//!
//! Settings are read once per run from a TOML file and turned into
//! [`SoftwareManager`]s. Storage credentials are resolved up front, and only
//! when some item downloads from storage.

use crate::paths;
use anyhow::{Context, Result, bail};
use provisioner::software::{self, Host, ItemSettings, NodeDirectories};
use provisioner::{MachineEnvironment, SoftwareManager, StorageCredentials};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest heap hint ever reported.
pub const MIN_HEAP_MB: u64 = 256;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Node name for display; defaults to the host name.
    #[serde(default)]
    pub node_name: Option<String>,

    pub directories: Directories,

    /// Machine environment file (Unix only; defaults to /etc/environment).
    #[serde(default)]
    pub environment_file: Option<String>,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub java: Option<JavaSettings>,

    #[serde(default)]
    pub elasticsearch: Option<ElasticsearchSettings>,

    #[serde(default)]
    pub heap: HeapSettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Directories {
    /// Archive cache
    pub download: String,
    /// Installer logs
    pub log: String,
    /// Elasticsearch install directory
    #[serde(default)]
    pub elasticsearch: Option<String>,
    /// Scratch space
    #[serde(default)]
    pub temp: Option<String>,
}

#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub account_key: Option<String>,
    #[serde(default)]
    pub endpoint_suffix: Option<String>,
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("connection_string", &self.connection_string.as_ref().map(|_| "<redacted>"))
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint_suffix", &self.endpoint_suffix)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JavaSettings {
    pub installer: String,
    pub download_url: String,
    #[serde(default)]
    pub download_type: String,
    #[serde(default)]
    pub install_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ElasticsearchSettings {
    pub archive: String,
    pub download_url: String,
    #[serde(default)]
    pub download_type: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeapSettings {
    #[serde(default)]
    pub size_mb: Option<u64>,
}

impl Settings {
    /// Load settings from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    /// Parse settings from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        if settings.directories.download.trim().is_empty() {
            bail!("directories.download must not be empty");
        }
        if settings.directories.log.trim().is_empty() {
            bail!("directories.log must not be empty");
        }
        Ok(settings)
    }

    /// Node name for display.
    pub fn node_name(&self) -> String {
        self.node_name
            .clone()
            .or_else(|| std::env::var("COMPUTERNAME").ok())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "local".to_string())
    }

    /// Resolved node directories.
    pub fn directories(&self) -> NodeDirectories {
        NodeDirectories {
            download: paths::expand(&self.directories.download),
            log: paths::expand(&self.directories.log),
        }
    }

    /// Resolved elasticsearch install directory.
    pub fn elasticsearch_dir(&self) -> Option<PathBuf> {
        self.directories
            .elasticsearch
            .as_deref()
            .map(paths::expand)
    }

    /// The machine environment store bindings are written to.
    pub fn environment(&self) -> MachineEnvironment {
        match &self.environment_file {
            Some(file) => MachineEnvironment::file(paths::expand(file)),
            None => MachineEnvironment::new(),
        }
    }

    /// Configured item names, in provisioning order.
    pub fn item_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.java.is_some() {
            names.push(software::java::NAME);
        }
        if self.elasticsearch.is_some() {
            names.push(software::elasticsearch::NAME);
        }
        names
    }

    /// Whether any item downloads from storage.
    pub fn needs_storage(&self) -> bool {
        let storage = |flag: &str| provisioner::DownloadType::from_flag(flag)
            == provisioner::DownloadType::Storage;
        self.java.as_ref().is_some_and(|j| storage(&j.download_type))
            || self
                .elasticsearch
                .as_ref()
                .is_some_and(|e| storage(&e.download_type))
    }

    /// Storage credentials, from a connection string or an account name and key.
    pub fn credentials(&self) -> Result<Option<StorageCredentials>> {
        let storage = &self.storage;
        if let Some(connection_string) = storage.connection_string.as_deref() {
            let credentials = StorageCredentials::from_connection_string(connection_string)
                .context("Invalid storage.connection_string")?;
            return Ok(Some(credentials));
        }

        match (&storage.account_name, &storage.account_key) {
            (Some(name), Some(key)) => {
                let credentials = StorageCredentials::from_account_key(
                    name,
                    key,
                    storage.endpoint_suffix.as_deref(),
                )
                .context("Invalid storage.account_key")?;
                Ok(Some(credentials))
            }
            (None, None) => Ok(None),
            _ => bail!("storage.account_name and storage.account_key must be set together"),
        }
    }

    /// Heap-size hint in MB: the configured size, or half of physical memory.
    pub fn heap_size_mb(&self) -> Option<u64> {
        self.heap
            .size_mb
            .or_else(|| physical_memory_mb().map(|total| (total / 2).max(MIN_HEAP_MB)))
    }

    /// Build managers for the configured items, restricted to `only` when
    /// non-empty.
    pub fn managers(&self, only: &[String]) -> Result<Vec<SoftwareManager>> {
        let names = self.item_names();
        for name in only {
            if !names.contains(&name.as_str()) {
                bail!(
                    "Unknown or unconfigured item '{}'. Configured: {}",
                    name,
                    names.join(", ")
                );
            }
        }
        let selected = |name: &str| only.is_empty() || only.iter().any(|o| o == name);

        let credentials = if self.needs_storage() {
            self.credentials()?
        } else {
            None
        };
        let dirs = self.directories();
        let environment = self.environment();
        let mut managers = Vec::new();

        if let Some(java) = &self.java
            && selected(software::java::NAME)
        {
            let item = ItemSettings {
                file_name: java.installer.clone(),
                locator: java.download_url.clone(),
                download_type: java.download_type.clone(),
                install_timeout: java.install_timeout_secs.map(Duration::from_secs),
            };
            let manager = software::java::manager(
                &item,
                &dirs,
                credentials.as_ref(),
                Host::system(environment.clone()),
            )
            .context("Failed to set up java")?;
            managers.push(manager);
        }

        if let Some(es) = &self.elasticsearch
            && selected(software::elasticsearch::NAME)
        {
            let install_dir = self
                .elasticsearch_dir()
                .context("directories.elasticsearch is required when [elasticsearch] is set")?;
            let item = ItemSettings {
                file_name: es.archive.clone(),
                locator: es.download_url.clone(),
                download_type: es.download_type.clone(),
                install_timeout: None,
            };
            let manager = software::elasticsearch::manager(
                &item,
                &dirs,
                &install_dir,
                credentials.as_ref(),
                Host::system(environment),
            )
            .context("Failed to set up elasticsearch")?;
            managers.push(manager);
        }

        Ok(managers)
    }
}

/// Total physical memory in MB.
#[cfg(unix)]
pub fn physical_memory_mb() -> Option<u64> {
    // SAFETY: sysconf has no preconditions.
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    // SAFETY: as above.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if pages <= 0 || page_size <= 0 {
        return None;
    }
    Some((pages as u64).saturating_mul(page_size as u64) / (1024 * 1024))
}

/// Total physical memory in MB.
#[cfg(not(unix))]
pub fn physical_memory_mb() -> Option<u64> {
    None
}
