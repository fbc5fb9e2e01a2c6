//! Java runtime preset.
//!
//! Installed with the vendor's silent installer; presence is read from the
//! `JavaSoft` registry key and `JAVA_HOME` is bound to the runtime home.

use super::{Host, ItemSettings, NodeDirectories};
use crate::cache::ArchiveCache;
use crate::environment::EnvironmentConfigurator;
use crate::error::Result;
use crate::installer::{LOG_PLACEHOLDER, SilentInstaller};
use crate::manager::SoftwareManager;
use crate::probe::RegistryProbe;
use crate::source::StorageCredentials;

/// Software name.
pub const NAME: &str = "java";
/// Registry key recording the installed runtime.
pub const REGISTRY_KEY: &str = "HKEY_LOCAL_MACHINE\\SOFTWARE\\JavaSoft\\Java Runtime Environment";
/// Value under [`REGISTRY_KEY`] holding the current version.
pub const VERSION_VALUE: &str = "CurrentVersion";
/// Value under `<REGISTRY_KEY>\<version>` holding the install home.
pub const HOME_VALUE: &str = "JavaHome";
/// Install log file name inside the log directory.
pub const INSTALL_LOG: &str = "jdk.txt";
/// Environment variable bound to the install home.
pub const BINDING: &str = "JAVA_HOME";

/// Silent installer arguments.
#[must_use]
pub fn installer_args() -> Vec<String> {
    vec!["/s".to_string(), "/L".to_string(), LOG_PLACEHOLDER.to_string()]
}

/// Build the Java runtime manager.
pub fn manager(
    item: &ItemSettings,
    dirs: &NodeDirectories,
    credentials: Option<&StorageCredentials>,
    host: Host,
) -> Result<SoftwareManager> {
    let source = item.source(credentials)?;
    let probe = RegistryProbe::new(host.registry, REGISTRY_KEY, VERSION_VALUE, HOME_VALUE);
    let installer = SilentInstaller::new(NAME, installer_args(), host.runner)
        .timeout(item.install_timeout);

    Ok(SoftwareManager::new(
        NAME,
        source,
        Box::new(probe),
        Box::new(installer),
        &ArchiveCache::new(&dirs.download),
        dirs.log.join(INSTALL_LOG),
    )
    .with_binding(EnvironmentConfigurator::new(BINDING, host.environment)))
}
