//! Installed-state probes.
//!
//! A probe answers "is this software installed, and where?" without touching
//! anything. Two strategies are provided: [`RegistryProbe`] reads the system
//! software registry, [`MarkerProbe`] reads a marker file left in the install
//! directory by [`ArchiveInstaller`](crate::installer::ArchiveInstaller).

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::types::InstalledRecord;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Read-only check for whether and what version of software is present.
pub trait InstalledStateProbe: Send + Sync {
    /// Installed version, or `None` when not installed.
    ///
    /// Blank values are reported as `None`.
    fn current_version(&self) -> Result<Option<String>>;

    /// Install home for `version`.
    ///
    /// # Panics
    ///
    /// Implementations panic when `version` is blank; callers must only ask
    /// after `current_version` returned a version.
    fn install_home(&self, version: &str) -> Result<Option<String>>;

    /// Version and home together, if installed.
    fn installed(&self) -> Result<Option<InstalledRecord>> {
        let Some(version) = self.current_version()? else {
            return Ok(None);
        };
        let install_home = self.install_home(&version)?.unwrap_or_default();
        Ok(Some(InstalledRecord {
            version,
            install_home,
        }))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn assert_version(version: &str) {
    assert!(
        !version.trim().is_empty(),
        "install home requested without an installed version"
    );
}

/// Probe that reads a version key and a per-version home key.
///
/// The version is `<key>` value `<version_value>`; the home is
/// `<key>\<version>` value `<home_value>`.
pub struct RegistryProbe {
    registry: Box<dyn Registry>,
    key: String,
    version_value: String,
    home_value: String,
}

impl RegistryProbe {
    /// Create a probe over `registry`.
    pub fn new(
        registry: Box<dyn Registry>,
        key: impl Into<String>,
        version_value: impl Into<String>,
        home_value: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            key: key.into(),
            version_value: version_value.into(),
            home_value: home_value.into(),
        }
    }

    /// Registry key for a specific version.
    #[must_use]
    pub fn version_key(&self, version: &str) -> String {
        format!("{}\\{}", self.key.trim_end_matches('\\'), version)
    }
}

impl InstalledStateProbe for RegistryProbe {
    fn current_version(&self) -> Result<Option<String>> {
        let value = self.registry.get_value(&self.key, &self.version_value)?;
        Ok(non_blank(value))
    }

    fn install_home(&self, version: &str) -> Result<Option<String>> {
        assert_version(version);
        let value = self
            .registry
            .get_value(&self.version_key(version), &self.home_value)?;
        Ok(non_blank(value))
    }
}

/// Marker file name written into an extracted install directory.
pub const INSTALL_MARKER: &str = ".nodeprep-installed";

/// Probe that reads a marker file in a fixed install directory.
///
/// The marker content is the installed version; the home is the directory.
#[derive(Debug, Clone)]
pub struct MarkerProbe {
    home: PathBuf,
}

impl MarkerProbe {
    /// Create a probe for software installed into `home`.
    #[must_use]
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Path of the marker file.
    #[must_use]
    pub fn marker_path(&self) -> PathBuf {
        marker_path(&self.home)
    }
}

/// Marker path for an install directory.
#[must_use]
pub fn marker_path(home: &Path) -> PathBuf {
    home.join(INSTALL_MARKER)
}

impl InstalledStateProbe for MarkerProbe {
    fn current_version(&self) -> Result<Option<String>> {
        let path = self.marker_path();
        match fs::read_to_string(&path) {
            Ok(content) => Ok(non_blank(Some(content.trim().to_string()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::config(format!(
                "cannot read install marker {}: {e}",
                path.display()
            ))),
        }
    }

    fn install_home(&self, version: &str) -> Result<Option<String>> {
        assert_version(version);
        Ok(Some(self.home.to_string_lossy().into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;

    const KEY: &str = "HKEY_LOCAL_MACHINE\\SOFTWARE\\JavaSoft\\Java Runtime Environment";

    fn java_probe(registry: &MemoryRegistry) -> RegistryProbe {
        RegistryProbe::new(Box::new(registry.clone()), KEY, "CurrentVersion", "JavaHome")
    }

    #[test]
    fn test_registry_probe_not_installed() {
        let registry = MemoryRegistry::new();
        let probe = java_probe(&registry);
        assert_eq!(probe.current_version().unwrap(), None);
        assert_eq!(probe.installed().unwrap(), None);
    }

    #[test]
    fn test_registry_probe_blank_version_is_not_installed() {
        let registry = MemoryRegistry::new();
        registry.set(KEY, "CurrentVersion", "  ");
        assert_eq!(java_probe(&registry).current_version().unwrap(), None);
    }

    #[test]
    fn test_registry_probe_installed() {
        let registry = MemoryRegistry::new();
        registry.set(KEY, "CurrentVersion", "1.8.0");
        registry.set(&format!("{KEY}\\1.8.0"), "JavaHome", "C:\\Java");

        let record = java_probe(&registry).installed().unwrap().unwrap();
        assert_eq!(record.version, "1.8.0");
        assert_eq!(record.install_home, "C:\\Java");
    }

    #[test]
    fn test_registry_probe_version_key() {
        let registry = MemoryRegistry::new();
        assert_eq!(
            java_probe(&registry).version_key("1.8"),
            format!("{KEY}\\1.8")
        );
    }

    #[test]
    #[should_panic(expected = "without an installed version")]
    fn test_registry_probe_home_requires_version() {
        let registry = MemoryRegistry::new();
        let _ = java_probe(&registry).install_home("");
    }

    #[test]
    fn test_marker_probe() {
        let dir = tempfile::tempdir().unwrap();
        let probe = MarkerProbe::new(dir.path());
        assert_eq!(probe.current_version().unwrap(), None);

        fs::write(probe.marker_path(), "elasticsearch-1.4.2.zip\n").unwrap();
        assert_eq!(
            probe.current_version().unwrap(),
            Some("elasticsearch-1.4.2.zip".to_string())
        );
        assert_eq!(
            probe.install_home("elasticsearch-1.4.2.zip").unwrap(),
            Some(dir.path().to_string_lossy().into_owned())
        );
    }

    #[test]
    fn test_marker_probe_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let probe = MarkerProbe::new(dir.path().join("never-created"));
        assert_eq!(probe.current_version().unwrap(), None);
    }

    #[test]
    #[should_panic(expected = "without an installed version")]
    fn test_marker_probe_home_requires_version() {
        let dir = tempfile::tempdir().unwrap();
        let _ = MarkerProbe::new(dir.path()).install_home(" ");
    }
}
