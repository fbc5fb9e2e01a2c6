//! # provisioner
//!
//! Idempotent software provisioning for node bootstrap.
//!
//! This crate provides functionality for:
//! - Fetching installers and archives over HTTP(S) or from an authenticated
//!   blob store
//! - Caching artifacts locally so a node never downloads twice
//! - Detecting installed software through the system registry or an install
//!   marker
//! - Running silent, elevated installers and unpacking release archives
//! - Binding a machine-scope environment variable to the install home
//!
//! ## Example
//!
//! ```no_run
//! use provisioner::software::{java, Host, ItemSettings, NodeDirectories};
//! use provisioner::MachineEnvironment;
//!
//! let item = ItemSettings {
//!     file_name: "jre-8u40-windows-x64.exe".to_string(),
//!     locator: "https://example.com/jre-8u40-windows-x64.exe".to_string(),
//!     download_type: "web".to_string(),
//!     install_timeout: None,
//! };
//! let dirs = NodeDirectories {
//!     download: "C:\\Resources\\ArchiveRoot".into(),
//!     log: "C:\\Resources\\LogRoot".into(),
//! };
//!
//! let manager = java::manager(&item, &dirs, None, Host::system(MachineEnvironment::new()))
//!     .expect("invalid settings");
//! let report = manager.ensure_configured().expect("provisioning failed");
//! println!("{}: {} change(s)", report.software, report.changes());
//! ```
//!
//! ## Sequence
//!
//! | Step      | Skipped when                         | On failure                |
//! |-----------|--------------------------------------|---------------------------|
//! | Cache     | archive file exists                  | `Error::FetchFailed`      |
//! | Install   | probe reports a version              | `Error::InstallFailed`    |
//! | Configure | variable already holds a value       | `Error::Configuration`    |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod environment;
pub mod error;
pub mod executor;
pub mod installer;
pub mod manager;
pub mod probe;
pub mod process;
pub mod registry;
pub mod software;
pub mod source;
pub mod types;

pub use cache::ArchiveCache;
pub use environment::{
    EnvironmentConfigurator, EnvironmentStore, MachineEnvironment, MemoryEnvironment,
};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{ItemOutcome, provision_all, provision_all_with};
pub use installer::{ArchiveInstaller, Installer, SilentInstaller};
pub use manager::SoftwareManager;
pub use probe::{InstalledStateProbe, MarkerProbe, RegistryProbe};
pub use process::{MockRunner, ProcessRunner, SystemRunner};
pub use registry::{MemoryRegistry, RegCli, Registry};
pub use source::{ArtifactSource, MockSource, StorageCredentials};
pub use types::{
    ArtifactDescriptor, DownloadType, InstalledRecord, ItemStatus, ProvisionReport, StepOutcome,
};
