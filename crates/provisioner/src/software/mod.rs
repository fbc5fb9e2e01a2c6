//! Software presets.
//!
//! Each preset wires the generic [`SoftwareManager`](crate::SoftwareManager)
//! with the probe, installer and environment binding for one concrete piece
//! of software.

pub mod elasticsearch;
pub mod java;

use crate::environment::{EnvironmentStore, MachineEnvironment};
use crate::error::Result;
use crate::process::{ProcessRunner, SystemRunner};
use crate::registry::{RegCli, Registry};
use crate::source::{self, ArtifactSource, StorageCredentials};
use crate::types::ArtifactDescriptor;
use std::path::PathBuf;
use std::time::Duration;

/// Per-item settings, already resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemSettings {
    /// Installer or archive file name, remote and local.
    pub file_name: String,
    /// URL, or `container/blob` path for storage downloads.
    pub locator: String,
    /// Download-type flag; `"storage"` selects the object store.
    pub download_type: String,
    /// Optional deadline for the installer.
    pub install_timeout: Option<Duration>,
}

impl ItemSettings {
    /// Build the artifact source for this item.
    pub fn source(
        &self,
        credentials: Option<&StorageCredentials>,
    ) -> Result<Box<dyn ArtifactSource>> {
        let descriptor = ArtifactDescriptor::new(&self.locator, &self.file_name)?;
        source::select(&self.download_type, descriptor, credentials)
    }
}

/// Node directories shared by every item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDirectories {
    /// Archive cache.
    pub download: PathBuf,
    /// Installer logs.
    pub log: PathBuf,
}

/// Host collaborators a preset talks to.
pub struct Host {
    /// Installed-software registry.
    pub registry: Box<dyn Registry>,
    /// Process launcher.
    pub runner: Box<dyn ProcessRunner>,
    /// Machine-scope environment.
    pub environment: Box<dyn EnvironmentStore>,
}

impl Host {
    /// The real host, with `environment` as the binding store.
    #[must_use]
    pub fn system(environment: MachineEnvironment) -> Self {
        Self {
            registry: Box::new(RegCli::new()),
            runner: Box::new(SystemRunner::new()),
            environment: Box::new(environment),
        }
    }
}
