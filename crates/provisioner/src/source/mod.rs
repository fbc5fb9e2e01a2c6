//! Artifact sources for fetching installers and archives.
//!
//! This module provides the [`ArtifactSource`] trait and its two variants:
//! [`web::WebArtifact`] for plain HTTP(S) downloads and
//! [`storage::StorageArtifact`] for authenticated blob reads.
//!
//! # Testing
//!
//! Use [`MockSource`] to exercise the orchestration without network access:
//!
//! ```
//! use provisioner::source::{ArtifactSource, MockSource};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let dest = dir.path().join("jre.exe");
//!
//! let mock = MockSource::with_payload(b"installer".to_vec());
//! mock.fetch(&dest).unwrap();
//! assert_eq!(mock.fetch_count(), 1);
//! assert!(dest.exists());
//! ```

pub mod storage;
pub mod web;

use crate::error::{Error, Result};
use crate::types::{ArtifactDescriptor, DownloadType};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use storage::{StorageArtifact, StorageCredentials};
pub use web::WebArtifact;

/// A backing store an artifact can be fetched from.
pub trait ArtifactSource: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> DownloadType;

    /// The artifact this source fetches.
    fn descriptor(&self) -> &ArtifactDescriptor;

    /// Download the artifact into `destination`.
    ///
    /// # Errors
    ///
    /// Returns `Error::FetchFailed` on a non-success response or transport
    /// error. No retry is attempted.
    fn fetch(&self, destination: &Path) -> Result<()>;
}

/// Build the source variant named by a settings download-type flag.
///
/// The object store is used only for the exact flag `"storage"`, in which
/// case credentials are required.
pub fn select(
    download_type: &str,
    descriptor: ArtifactDescriptor,
    credentials: Option<&StorageCredentials>,
) -> Result<Box<dyn ArtifactSource>> {
    match DownloadType::from_flag(download_type) {
        DownloadType::Storage => {
            let credentials = credentials.ok_or_else(|| {
                Error::config(format!(
                    "{} is configured for storage download but no storage credentials are set",
                    descriptor.local_file_name
                ))
            })?;
            Ok(Box::new(StorageArtifact::new(descriptor, credentials.clone())))
        }
        DownloadType::Web => Ok(Box::new(WebArtifact::new(descriptor))),
    }
}

/// Copy a response body to `destination` through a `.part` file.
///
/// The final path only appears once the whole body has been written, so an
/// interrupted download never satisfies the archive cache's presence check.
pub(crate) fn write_atomically(
    reader: &mut dyn Read,
    destination: &Path,
    descriptor: &ArtifactDescriptor,
) -> Result<u64> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let partial = partial_path(destination);
    let mut file = fs::File::create(&partial).map_err(|e| Error::io(&partial, e))?;

    let written = match io::copy(reader, &mut file) {
        Ok(n) => n,
        Err(e) => {
            drop(file);
            let _ = fs::remove_file(&partial);
            return Err(Error::FetchFailed {
                artifact: descriptor.local_file_name.clone(),
                locator: descriptor.remote_locator.clone(),
                message: format!("download interrupted: {e}"),
                status: None,
            });
        }
    };
    file.sync_all().map_err(|e| Error::io(&partial, e))?;
    drop(file);

    fs::rename(&partial, destination).map_err(|e| Error::io(destination, e))?;
    Ok(written)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Convert a `ureq` failure into a fetch failure for `descriptor`.
pub(crate) fn fetch_error(descriptor: &ArtifactDescriptor, err: ureq::Error) -> Error {
    let (message, status) = match err {
        ureq::Error::StatusCode(code) => (format!("HTTP {code}"), Some(code)),
        other => (other.to_string(), None),
    };
    Error::FetchFailed {
        artifact: descriptor.local_file_name.clone(),
        locator: descriptor.remote_locator.clone(),
        message,
        status,
    }
}

/// In-memory source for tests.
///
/// Counts fetches so tests can assert the cache short-circuits downloads.
#[derive(Debug, Clone)]
pub struct MockSource {
    descriptor: ArtifactDescriptor,
    payload: Option<Vec<u8>>,
    fetches: Arc<AtomicUsize>,
}

impl MockSource {
    /// A source that writes `payload` on every fetch.
    #[must_use]
    pub fn with_payload(payload: Vec<u8>) -> Self {
        Self {
            descriptor: ArtifactDescriptor {
                remote_locator: "mock://artifact".to_string(),
                local_file_name: "artifact".to_string(),
            },
            payload: Some(payload),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A source whose fetch always fails with the given HTTP status.
    #[must_use]
    pub fn failing(status: u16) -> Self {
        let mut mock = Self::with_payload(Vec::new());
        mock.payload = None;
        mock.descriptor.remote_locator = format!("mock://status/{status}");
        mock
    }

    /// Use `file_name` as the artifact's local file name.
    #[must_use]
    pub fn named(mut self, file_name: &str) -> Self {
        self.descriptor.local_file_name = file_name.to_string();
        self
    }

    /// Number of times `fetch` has been called.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for MockSource {
    fn kind(&self) -> DownloadType {
        DownloadType::Web
    }

    fn descriptor(&self) -> &ArtifactDescriptor {
        &self.descriptor
    }

    fn fetch(&self, destination: &Path) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.payload {
            Some(payload) => {
                write_atomically(&mut payload.as_slice(), destination, &self.descriptor)?;
                Ok(())
            }
            None => {
                let status = self
                    .descriptor
                    .remote_locator
                    .rsplit('/')
                    .next()
                    .and_then(|s| s.parse().ok());
                Err(Error::FetchFailed {
                    artifact: self.descriptor.local_file_name.clone(),
                    locator: self.descriptor.remote_locator.clone(),
                    message: "mock failure".to_string(),
                    status,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ArtifactDescriptor {
        ArtifactDescriptor::new("container/jre.exe", "jre.exe").unwrap()
    }

    #[test]
    fn test_select_storage() {
        let creds = StorageCredentials::from_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        let source = select("storage", descriptor(), Some(&creds)).unwrap();
        assert_eq!(source.kind(), DownloadType::Storage);
    }

    #[test]
    fn test_select_storage_requires_credentials() {
        let result = select("storage", descriptor(), None);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_select_web_for_other_flags() {
        for flag in ["web", "", "   ", "Storage", "blob"] {
            let source = select(flag, descriptor(), None).unwrap();
            assert_eq!(source.kind(), DownloadType::Web, "flag {flag:?}");
        }
    }

    #[test]
    fn test_write_atomically_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("jre.exe");

        let written = write_atomically(&mut &b"payload"[..], &dest, &descriptor()).unwrap();
        assert_eq!(written, 7);
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn test_partial_path() {
        let path = partial_path(Path::new("/cache/jre.exe"));
        assert_eq!(path, PathBuf::from("/cache/jre.exe.part"));
    }

    #[test]
    fn test_mock_source_counts_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockSource::with_payload(vec![1, 2, 3]);
        mock.fetch(&dir.path().join("a")).unwrap();
        mock.fetch(&dir.path().join("b")).unwrap();
        assert_eq!(mock.fetch_count(), 2);
    }

    #[test]
    fn test_mock_source_failing() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockSource::failing(503);
        let err = mock.fetch(&dir.path().join("a")).unwrap_err();
        match err {
            Error::FetchFailed { status, .. } => assert_eq!(status, Some(503)),
            other => panic!("Expected Error::FetchFailed, got {other:?}"),
        }
        assert!(!dir.path().join("a").exists());
    }
}
