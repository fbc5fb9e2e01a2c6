//! Installer invocation.
//!
//! [`SilentInstaller`] runs the cached artifact as an unattended, elevated
//! installer process. [`ArchiveInstaller`] unpacks a zip or tar.gz archive
//! into a fixed directory and leaves an install marker behind.

use crate::error::{Error, Result};
use crate::probe::marker_path;
use crate::process::{ProcessRequest, ProcessRunner};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder in installer arguments replaced with the install-log path.
pub const LOG_PLACEHOLDER: &str = "{log}";

/// Installs software from a cached artifact.
pub trait Installer: Send + Sync {
    /// Install from `archive`, writing the installation log to `log_path`.
    ///
    /// # Errors
    ///
    /// A failed installation is fatal; implementations never retry.
    fn install(&self, archive: &Path, log_path: &Path) -> Result<()>;
}

/// Runs the artifact itself as a silent installer.
pub struct SilentInstaller {
    software: String,
    args: Vec<String>,
    runner: Box<dyn ProcessRunner>,
    timeout: Option<Duration>,
}

impl SilentInstaller {
    /// Create an installer for `software`.
    ///
    /// Occurrences of `{log}` in `args` are replaced with the log path.
    pub fn new(
        software: impl Into<String>,
        args: Vec<String>,
        runner: Box<dyn ProcessRunner>,
    ) -> Self {
        Self {
            software: software.into(),
            args,
            runner,
            timeout: None,
        }
    }

    /// Kill the installer if it runs longer than `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn args_for(&self, log_path: &Path) -> Vec<String> {
        let log = log_path.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(LOG_PLACEHOLDER, &log))
            .collect()
    }
}

impl Installer for SilentInstaller {
    fn install(&self, archive: &Path, log_path: &Path) -> Result<()> {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let request = ProcessRequest::new(archive, self.args_for(log_path)).timeout(self.timeout);
        let outcome = self.runner.run(&request)?;

        if !outcome.success() {
            return Err(Error::InstallFailed {
                software: self.software.clone(),
                exit_code: outcome.exit_code,
                stderr: outcome.stderr,
            });
        }

        if !outcome.stderr.trim().is_empty() {
            log::debug!(
                "{} installer wrote to stderr: {}",
                self.software,
                outcome.stderr.trim()
            );
        }
        Ok(())
    }
}

/// Archive formats the [`ArchiveInstaller`] understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.zip`
    Zip,
    /// `.tar.gz` / `.tgz`
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from a file name.
    #[must_use]
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// Unpacks an archive into a fixed directory.
///
/// A single top-level directory in the archive is flattened away. The install
/// marker, holding the archive file name, is written last so a partial
/// extraction is never reported as installed.
#[derive(Debug, Clone)]
pub struct ArchiveInstaller {
    software: String,
    target: PathBuf,
}

impl ArchiveInstaller {
    /// Create an installer that unpacks into `target`.
    pub fn new(software: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            software: software.into(),
            target: target.into(),
        }
    }

    fn staging_dir(&self) -> PathBuf {
        let mut name = self
            .target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".extracting");
        self.target.with_file_name(name)
    }
}

impl Installer for ArchiveInstaller {
    fn install(&self, archive: &Path, log_path: &Path) -> Result<()> {
        let file_name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Extraction(format!("invalid archive path {}", archive.display())))?;
        let format = ArchiveFormat::detect(file_name)
            .ok_or_else(|| Error::Extraction(format!("unknown archive format: {file_name}")))?;

        log::info!(
            "Extracting {} into {}",
            file_name,
            self.target.display()
        );

        let staging = self.staging_dir();
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| Error::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| Error::io(&staging, e))?;

        match format {
            ArchiveFormat::Zip => extract_zip(archive, &staging)?,
            ArchiveFormat::TarGz => extract_tar_gz(archive, &staging)?,
        }
        flatten_single_subdir(&staging)?;

        let moved = move_entries(&staging, &self.target)?;
        fs::remove_dir_all(&staging).map_err(|e| Error::io(&staging, e))?;

        let marker = marker_path(&self.target);
        fs::write(&marker, file_name).map_err(|e| Error::io(&marker, e))?;

        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let log = format!(
            "{}: extracted {} entries from {} into {}\n",
            self.software,
            moved,
            archive.display(),
            self.target.display()
        );
        fs::write(log_path, log).map_err(|e| Error::io(log_path, e))?;
        Ok(())
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive).map_err(|e| Error::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(dest)?;
    Ok(())
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive).map_err(|e| Error::io(archive, e))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tar = tar::Archive::new(decoder);
    tar.unpack(dest)
        .map_err(|e| Error::Extraction(format!("{}: {e}", archive.display())))?;
    Ok(())
}

/// Release archives usually wrap everything in one top-level directory.
fn flatten_single_subdir(dir: &Path) -> Result<()> {
    let entries: Vec<_> = fs::read_dir(dir)
        .map_err(|e| Error::io(dir, e))?
        .filter_map(std::result::Result::ok)
        .collect();

    if entries.len() == 1 && entries[0].path().is_dir() {
        let subdir = entries[0].path();
        let temp = dir.join("__flatten_temp__");
        fs::rename(&subdir, &temp).map_err(|e| Error::io(&subdir, e))?;

        for entry in fs::read_dir(&temp).map_err(|e| Error::io(&temp, e))? {
            let entry = entry.map_err(|e| Error::io(&temp, e))?;
            let to = dir.join(entry.file_name());
            fs::rename(entry.path(), &to).map_err(|e| Error::io(&to, e))?;
        }
        fs::remove_dir(&temp).map_err(|e| Error::io(&temp, e))?;
    }

    Ok(())
}

/// Move everything in `from` into `to`, replacing leftovers of an earlier
/// unfinished extraction.
fn move_entries(from: &Path, to: &Path) -> Result<usize> {
    fs::create_dir_all(to).map_err(|e| Error::io(to, e))?;
    let mut moved = 0;
    for entry in fs::read_dir(from).map_err(|e| Error::io(from, e))? {
        let entry = entry.map_err(|e| Error::io(from, e))?;
        let dest = to.join(entry.file_name());
        if dest.is_dir() {
            fs::remove_dir_all(&dest).map_err(|e| Error::io(&dest, e))?;
        } else if dest.exists() {
            fs::remove_file(&dest).map_err(|e| Error::io(&dest, e))?;
        }
        fs::rename(entry.path(), &dest).map_err(|e| Error::io(&dest, e))?;
        moved += 1;
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{InstalledStateProbe, MarkerProbe};
    use crate::process::MockRunner;
    use std::io::Write;

    fn java_installer(runner: &MockRunner) -> SilentInstaller {
        SilentInstaller::new(
            "java",
            vec!["/s".to_string(), "/L".to_string(), LOG_PLACEHOLDER.to_string()],
            Box::new(runner.clone()),
        )
    }

    #[test]
    fn test_silent_installer_substitutes_log_path() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("jdk.txt");
        let runner = MockRunner::exiting(0, "");

        java_installer(&runner)
            .install(Path::new("/cache/jre.exe"), &log)
            .unwrap();

        let requests = runner.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].program, PathBuf::from("/cache/jre.exe"));
        assert_eq!(
            requests[0].args,
            vec!["/s".to_string(), "/L".to_string(), log.display().to_string()]
        );
        assert!(requests[0].elevated);
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_silent_installer_nonzero_exit_is_install_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::exiting(1603, "disk full");

        let err = java_installer(&runner)
            .install(Path::new("/cache/jre.exe"), &dir.path().join("jdk.txt"))
            .unwrap_err();

        match err {
            Error::InstallFailed {
                software,
                exit_code,
                stderr,
            } => {
                assert_eq!(software, "java");
                assert_eq!(exit_code, 1603);
                assert_eq!(stderr, "disk full");
            }
            other => panic!("Expected Error::InstallFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_silent_installer_zero_exit_ignores_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::exiting(0, "warning: reboot recommended");
        java_installer(&runner)
            .install(Path::new("/cache/jre.exe"), &dir.path().join("jdk.txt"))
            .unwrap();
    }

    #[test]
    fn test_silent_installer_passes_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::exiting(0, "");
        java_installer(&runner)
            .timeout(Some(Duration::from_secs(60)))
            .install(Path::new("/cache/jre.exe"), &dir.path().join("jdk.txt"))
            .unwrap();
        assert_eq!(runner.requests()[0].timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_archive_format_detect() {
        assert_eq!(ArchiveFormat::detect("elasticsearch-1.4.2.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect("es.TAR.GZ"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect("es.tgz"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect("jre.exe"), None);
    }

    fn write_zip(path: &Path) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.add_directory("elasticsearch-1.4.2/bin/", options).unwrap();
        zip.start_file("elasticsearch-1.4.2/bin/elasticsearch.bat", options)
            .unwrap();
        zip.write_all(b"@echo off").unwrap();
        zip.start_file("elasticsearch-1.4.2/LICENSE.txt", options)
            .unwrap();
        zip.write_all(b"license").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_archive_installer_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("elasticsearch-1.4.2.zip");
        write_zip(&archive);
        let target = dir.path().join("elastic");
        let log = dir.path().join("logs").join("es.txt");

        ArchiveInstaller::new("elasticsearch", &target)
            .install(&archive, &log)
            .unwrap();

        assert!(target.join("bin").join("elasticsearch.bat").is_file());
        assert!(target.join("LICENSE.txt").is_file());
        assert!(!dir.path().join("elastic.extracting").exists());
        assert!(fs::read_to_string(&log).unwrap().contains("extracted 2 entries"));

        let probe = MarkerProbe::new(&target);
        assert_eq!(
            probe.current_version().unwrap(),
            Some("elasticsearch-1.4.2.zip".to_string())
        );
    }

    #[test]
    fn test_archive_installer_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("es.tar.gz");
        {
            let file = fs::File::create(&archive).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"#!/bin/sh";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "es/bin/elasticsearch", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }
        let target = dir.path().join("elastic");

        ArchiveInstaller::new("elasticsearch", &target)
            .install(&archive, &dir.path().join("es.txt"))
            .unwrap();

        assert!(target.join("bin").join("elasticsearch").is_file());
        assert!(marker_path(&target).is_file());
    }

    #[test]
    fn test_archive_installer_replaces_unfinished_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("elasticsearch-1.4.2.zip");
        write_zip(&archive);
        let target = dir.path().join("elastic");
        fs::create_dir_all(target.join("bin")).unwrap();
        fs::write(target.join("bin").join("partial"), b"x").unwrap();

        ArchiveInstaller::new("elasticsearch", &target)
            .install(&archive, &dir.path().join("es.txt"))
            .unwrap();

        assert!(!target.join("bin").join("partial").exists());
        assert!(target.join("bin").join("elasticsearch.bat").is_file());
    }

    #[test]
    fn test_archive_installer_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("jre.exe");
        fs::write(&archive, b"MZ").unwrap();

        let err = ArchiveInstaller::new("elasticsearch", dir.path().join("elastic"))
            .install(&archive, &dir.path().join("es.txt"))
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn test_archive_installer_corrupt_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("es.zip");
        fs::write(&archive, b"not a zip").unwrap();

        let err = ArchiveInstaller::new("elasticsearch", dir.path().join("elastic"))
            .install(&archive, &dir.path().join("es.txt"))
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert!(!marker_path(&dir.path().join("elastic")).exists());
    }

    #[test]
    fn test_flatten_single_subdir_noop_for_multiple_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();

        flatten_single_subdir(dir.path()).unwrap();

        assert!(dir.path().join("a").exists());
        assert!(dir.path().join("b").exists());
    }
}
