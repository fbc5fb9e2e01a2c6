//! Elasticsearch preset.
//!
//! The release archive is unpacked into the node's elasticsearch directory.
//! An install marker in that directory stands in for a registry entry, and
//! `ES_HOME` is bound to the directory.

use super::{Host, ItemSettings, NodeDirectories};
use crate::cache::ArchiveCache;
use crate::environment::EnvironmentConfigurator;
use crate::error::Result;
use crate::installer::ArchiveInstaller;
use crate::manager::SoftwareManager;
use crate::probe::MarkerProbe;
use crate::source::StorageCredentials;
use std::path::Path;

/// Software name.
pub const NAME: &str = "elasticsearch";
/// Extraction log file name inside the log directory.
pub const INSTALL_LOG: &str = "elasticsearch-install.txt";
/// Environment variable bound to the install directory.
pub const BINDING: &str = "ES_HOME";

/// Build the Elasticsearch manager, installing into `install_dir`.
pub fn manager(
    item: &ItemSettings,
    dirs: &NodeDirectories,
    install_dir: &Path,
    credentials: Option<&StorageCredentials>,
    host: Host,
) -> Result<SoftwareManager> {
    let source = item.source(credentials)?;

    Ok(SoftwareManager::new(
        NAME,
        source,
        Box::new(MarkerProbe::new(install_dir)),
        Box::new(ArchiveInstaller::new(NAME, install_dir)),
        &ArchiveCache::new(&dirs.download),
        dirs.log.join(INSTALL_LOG),
    )
    .with_binding(EnvironmentConfigurator::new(BINDING, host.environment)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentStore, MemoryEnvironment};
    use crate::process::MockRunner;
    use crate::registry::MemoryRegistry;
    use std::fs;
    use std::io::Write;

    fn write_release_zip(path: &Path) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("elasticsearch-1.4.2/bin/elasticsearch.bat", options)
            .unwrap();
        zip.write_all(b"@echo off").unwrap();
        zip.start_file("elasticsearch-1.4.2/config/elasticsearch.yml", options)
            .unwrap();
        zip.write_all(b"cluster.name: es").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_elasticsearch_end_to_end_from_cached_archive() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = NodeDirectories {
            download: dir.path().join("archive"),
            log: dir.path().join("logs"),
        };
        fs::create_dir_all(&dirs.download).unwrap();
        write_release_zip(&dirs.download.join("elasticsearch-1.4.2.zip"));
        let install_dir = dir.path().join("elastic");

        let item = ItemSettings {
            file_name: "elasticsearch-1.4.2.zip".to_string(),
            locator: "http://127.0.0.1:9/never-fetched.zip".to_string(),
            download_type: "web".to_string(),
            install_timeout: None,
        };
        let env = MemoryEnvironment::new();
        let host = Host {
            registry: Box::new(MemoryRegistry::new()),
            runner: Box::new(MockRunner::exiting(0, "")),
            environment: Box::new(env.clone()),
        };

        let manager = manager(&item, &dirs, &install_dir, None, host).unwrap();
        let report = manager.ensure_configured().unwrap();

        assert!(!report.artifact.is_applied());
        assert!(report.install.is_applied());
        assert!(report.environment.is_applied());
        assert!(install_dir.join("bin").join("elasticsearch.bat").is_file());
        assert!(dirs.log.join(INSTALL_LOG).is_file());
        assert_eq!(
            env.get(BINDING).unwrap(),
            Some(install_dir.to_string_lossy().into_owned())
        );

        let again = manager.ensure_configured().unwrap();
        assert_eq!(again.changes(), 0);
        let status = manager.status().unwrap();
        assert_eq!(
            status.installed.unwrap().version,
            "elasticsearch-1.4.2.zip"
        );
    }
}
