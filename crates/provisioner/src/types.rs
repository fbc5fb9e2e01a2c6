//! Core types for software provisioning.
//!
//! This module contains the data structures shared by the artifact sources,
//! probes, installers and the orchestrating [`SoftwareManager`].
//!
//! [`SoftwareManager`]: crate::SoftwareManager

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an artifact is downloaded from.
///
/// Chosen once when a software item is constructed, from the settings
/// download-type flag.
///
/// # Example
///
/// ```
/// use provisioner::DownloadType;
///
/// assert_eq!(DownloadType::from_flag("storage"), DownloadType::Storage);
/// assert_eq!(DownloadType::from_flag(""), DownloadType::Web);
/// assert_eq!(DownloadType::from_flag("Storage"), DownloadType::Web);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadType {
    /// Unauthenticated HTTP(S) GET.
    Web,
    /// Authenticated blob read from the object store.
    Storage,
}

impl DownloadType {
    /// Flag value that selects the object store.
    pub const STORAGE_FLAG: &'static str = "storage";

    /// Interpret a settings flag.
    ///
    /// Only the exact value `"storage"` selects the object store; anything
    /// else, including blank values, selects the web source.
    #[must_use]
    pub fn from_flag(flag: &str) -> Self {
        if flag == Self::STORAGE_FLAG {
            Self::Storage
        } else {
            Self::Web
        }
    }

    /// Get the type name as a string.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for DownloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Remote locator and local file name of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// URL (web) or `container/blob` path (storage).
    pub remote_locator: String,
    /// File name used in the local archive cache.
    pub local_file_name: String,
}

impl ArtifactDescriptor {
    /// Create a descriptor.
    ///
    /// The local file name must be a bare, non-empty file name so the
    /// artifact stays inside the archive cache.
    pub fn new(remote_locator: impl Into<String>, local_file_name: impl Into<String>) -> Result<Self> {
        let local_file_name = local_file_name.into();
        if local_file_name.trim().is_empty() {
            return Err(Error::config("artifact file name is empty"));
        }
        if local_file_name.contains(['/', '\\', ':']) || matches!(local_file_name.as_str(), "." | "..") {
            return Err(Error::config(format!(
                "artifact file name '{local_file_name}' must not contain a path"
            )));
        }
        Ok(Self {
            remote_locator: remote_locator.into(),
            local_file_name,
        })
    }
}

/// What the installed-state probe found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRecord {
    /// Installed version string.
    pub version: String,
    /// Install home directory.
    pub install_home: String,
}

/// Outcome of one idempotent step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// The postcondition already held; nothing was done.
    AlreadySatisfied {
        /// What was found.
        detail: String,
    },
    /// The step ran and established its postcondition.
    Applied {
        /// What was done.
        detail: String,
    },
}

impl StepOutcome {
    /// Whether the step did work.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Detail text for display.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::AlreadySatisfied { detail } | Self::Applied { detail } => detail,
        }
    }
}

/// Result of a successful `ensure_configured` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReport {
    /// Software item name.
    pub software: String,
    /// Archive cache step.
    pub artifact: StepOutcome,
    /// Install step.
    pub install: StepOutcome,
    /// Environment binding step.
    pub environment: StepOutcome,
}

impl ProvisionReport {
    /// Number of steps that did work.
    #[must_use]
    pub fn changes(&self) -> usize {
        [&self.artifact, &self.install, &self.environment]
            .iter()
            .filter(|s| s.is_applied())
            .count()
    }
}

/// Read-only view of a software item's state on this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStatus {
    /// Software item name.
    pub software: String,
    /// Path of the cached archive.
    pub archive_path: String,
    /// Whether the archive is cached.
    pub archive_cached: bool,
    /// Installed record, if any.
    pub installed: Option<InstalledRecord>,
    /// Binding name and its current value (empty if unset).
    pub binding: Option<(String, String)>,
}

impl ItemStatus {
    /// Whether every step's postcondition holds.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.archive_cached
            && self.installed.is_some()
            && self
                .binding
                .as_ref()
                .is_none_or(|(_, value)| !value.trim().is_empty())
    }
}
