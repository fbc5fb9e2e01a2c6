//! The software manager: cache, install, configure.
//!
//! A [`SoftwareManager`] is assembled by composition from an artifact source,
//! an installed-state probe, an installer and an optional environment
//! binding. [`SoftwareManager::ensure_configured`] drives the three steps
//! strictly in order and stops at the first failure:
//!
//! ```text
//! START -> cache check -> DOWNLOADED -> install check -> INSTALLED -> env check -> CONFIGURED
//! ```
//!
//! Every step is idempotent, so running the manager on a node that is
//! already provisioned does nothing.

use crate::cache::ArchiveCache;
use crate::environment::EnvironmentConfigurator;
use crate::error::Result;
use crate::installer::Installer;
use crate::probe::InstalledStateProbe;
use crate::source::ArtifactSource;
use crate::types::{ItemStatus, ProvisionReport, StepOutcome};
use std::path::{Path, PathBuf};

/// One piece of software that must end up downloaded, installed and
/// environment-configured on this node.
pub struct SoftwareManager {
    name: String,
    source: Box<dyn ArtifactSource>,
    probe: Box<dyn InstalledStateProbe>,
    installer: Box<dyn Installer>,
    binding: Option<EnvironmentConfigurator>,
    archive_path: PathBuf,
    log_path: PathBuf,
}

impl SoftwareManager {
    /// Assemble a manager.
    ///
    /// The archive is cached at `cache.path_for(<artifact file name>)` and
    /// the installer writes its log to `log_path`.
    pub fn new(
        name: impl Into<String>,
        source: Box<dyn ArtifactSource>,
        probe: Box<dyn InstalledStateProbe>,
        installer: Box<dyn Installer>,
        cache: &ArchiveCache,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        let archive_path = cache.path_for(&source.descriptor().local_file_name);
        Self {
            name: name.into(),
            source,
            probe,
            installer,
            binding: None,
            archive_path,
            log_path: log_path.into(),
        }
    }

    /// Bind an environment variable to the install home.
    #[must_use]
    pub fn with_binding(mut self, binding: EnvironmentConfigurator) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Software name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Artifact file name.
    #[must_use]
    pub fn artifact_file_name(&self) -> &str {
        &self.source.descriptor().local_file_name
    }

    /// Where the archive is cached.
    #[must_use]
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Where the installer writes its log.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Bring this software to the configured state.
    ///
    /// # Errors
    ///
    /// Returns the first failure; later steps are not attempted.
    pub fn ensure_configured(&self) -> Result<ProvisionReport> {
        let artifact = ArchiveCache::ensure(self.source.as_ref(), &self.archive_path)?;
        let install = self.ensure_installed()?;
        let environment = match &self.binding {
            Some(binding) => binding.ensure_configured(self.probe.as_ref())?,
            None => StepOutcome::AlreadySatisfied {
                detail: "no environment binding".to_string(),
            },
        };

        Ok(ProvisionReport {
            software: self.name.clone(),
            artifact,
            install,
            environment,
        })
    }

    fn ensure_installed(&self) -> Result<StepOutcome> {
        if let Some(version) = self.probe.current_version()? {
            log::debug!("{} {} already installed", self.name, version);
            return Ok(StepOutcome::AlreadySatisfied {
                detail: format!("version {version} installed"),
            });
        }

        log::info!("{} not installed. Starting installer", self.name);
        self.installer.install(&self.archive_path, &self.log_path)?;
        log::info!("{} installer complete", self.name);

        Ok(StepOutcome::Applied {
            detail: format!(
                "installed from {} (log: {})",
                self.artifact_file_name(),
                self.log_path.display()
            ),
        })
    }

    /// Report the current state without changing anything.
    pub fn status(&self) -> Result<ItemStatus> {
        let binding = match &self.binding {
            Some(binding) => Some((binding.name().to_string(), binding.current()?)),
            None => None,
        };

        Ok(ItemStatus {
            software: self.name.clone(),
            archive_path: self.archive_path.display().to_string(),
            archive_cached: ArchiveCache::exists(&self.archive_path),
            installed: self.probe.installed()?,
            binding,
        })
    }
}
