//! Plain HTTP(S) artifact source.

use crate::error::Result;
use crate::source::{ArtifactSource, fetch_error, write_atomically};
use crate::types::{ArtifactDescriptor, DownloadType};
use std::path::Path;

const USER_AGENT: &str = concat!("nodeprep-provisioner/", env!("CARGO_PKG_VERSION"));

/// Downloads an artifact with an unauthenticated GET.
pub struct WebArtifact {
    agent: ureq::Agent,
    descriptor: ArtifactDescriptor,
}

impl WebArtifact {
    /// Create a source for `descriptor.remote_locator`.
    #[must_use]
    pub fn new(descriptor: ArtifactDescriptor) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            descriptor,
        }
    }

    /// The URL this source downloads from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.descriptor.remote_locator
    }
}

impl ArtifactSource for WebArtifact {
    fn kind(&self) -> DownloadType {
        DownloadType::Web
    }

    fn descriptor(&self) -> &ArtifactDescriptor {
        &self.descriptor
    }

    fn fetch(&self, destination: &Path) -> Result<()> {
        log::info!(
            "Downloading {} from {}",
            self.descriptor.local_file_name,
            self.url()
        );

        let mut response = self
            .agent
            .get(self.url())
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/octet-stream")
            .call()
            .map_err(|e| fetch_error(&self.descriptor, e))?;

        let bytes = write_atomically(
            &mut response.body_mut().as_reader(),
            destination,
            &self.descriptor,
        )?;

        log::info!(
            "Downloaded {} ({} bytes) to {}",
            self.descriptor.local_file_name,
            bytes,
            destination.display()
        );
        Ok(())
    }
}
