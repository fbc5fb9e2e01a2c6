//! Error types for provisioning operations.
//!
//! Every failure is fatal to the software item being provisioned. Errors are
//! categorized so callers can present appropriate feedback; the provisioner
//! itself never retries.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of provisioning errors for user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Artifact could not be retrieved.
    Network,
    /// Installer process failed or could not run.
    Install,
    /// Registry, environment or settings problem.
    Configuration,
    /// Permission denied on the filesystem.
    Permission,
    /// Archive or credential format error.
    Format,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Artifact download failed",
            Self::Install => "Installer failed",
            Self::Configuration => "Node configuration problem",
            Self::Permission => "Permission denied",
            Self::Format => "Invalid file or credential format",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the download URL, storage container and node connectivity",
            Self::Install => "Inspect the installer log in the log directory",
            Self::Configuration => "Check the settings file and that the bootstrap task runs elevated",
            Self::Permission => "Check directory permissions or run with appropriate access",
            Self::Format => "Verify the archive or connection string is not corrupted",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while provisioning software.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The artifact could not be fetched.
    #[error("failed to fetch {artifact} from {locator}: {message}")]
    FetchFailed {
        /// Local file name of the artifact.
        artifact: String,
        /// URL or blob path it was fetched from.
        locator: String,
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The installer exited with a non-zero code.
    #[error("{software} installation failed with exit code {exit_code}: {stderr}")]
    InstallFailed {
        /// Software being installed.
        software: String,
        /// Exit code reported by the installer.
        exit_code: i32,
        /// Captured standard error, verbatim.
        stderr: String,
    },

    /// Registry, environment or settings could not be read or written.
    #[error("configuration failure: {0}")]
    Configuration(String),

    /// Storage credentials could not be parsed.
    #[error("invalid storage credentials: {0}")]
    InvalidCredentials(String),

    /// A process could not be started.
    #[error("failed to launch {program}: {source}")]
    Launch {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The installer did not finish before its deadline.
    #[error("{program} did not exit within {seconds}s")]
    Timeout {
        /// Program that was killed.
        program: String,
        /// Deadline in seconds.
        seconds: u64,
    },

    /// Archive extraction failed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::FetchFailed { .. } => ErrorCategory::Network,
            Error::InstallFailed { .. } | Error::Launch { .. } | Error::Timeout { .. } => {
                ErrorCategory::Install
            }
            Error::Configuration(_) => ErrorCategory::Configuration,
            Error::InvalidCredentials(_) | Error::Extraction(_) => ErrorCategory::Format,
            Error::Io { source, .. } => {
                if source.kind() == io::ErrorKind::PermissionDenied {
                    ErrorCategory::Permission
                } else {
                    ErrorCategory::Other
                }
            }
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Extraction(err.to_string())
    }
}
