//! Error taxonomy for a release run.
//!
//! Every variant is fatal to the run. They are raised wrapped in
//! `anyhow::Error` so callers can add context while tests can still
//! `downcast_ref::<ReleaseError>()` to check which failure happened.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReleaseError {
    /// A required manifest file for the project does not exist
    #[error("Could not locate {kind} file for {project} at {}.", path.display())]
    MissingInput {
        kind: InputKind,
        project: String,
        path: PathBuf,
    },

    /// A manifest file exists but does not have the expected shape
    #[error("Invalid manifest {}: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    /// A declared build has no matching local package
    #[error("Could not locate build package for [{platform}].")]
    MissingPackage { build: String, platform: String },

    /// The upload command ran and reported failure
    #[error("Upload of {} to {destination} failed ({status})", source_path.display())]
    UploadFailed {
        source_path: PathBuf,
        destination: String,
        status: ExitStatus,
    },

    /// The upload command did not finish in time and was killed
    #[error("Upload to {destination} timed out after {}s", timeout.as_secs())]
    UploadTimedOut {
        destination: String,
        timeout: Duration,
    },

    /// The upload command is not on PATH
    #[error("{command} is required but not found in PATH")]
    UploaderNotFound { command: String },
}

impl ReleaseError {
    /// A build in the manifest at `path` declares no supported platforms
    pub fn no_platforms(path: impl Into<PathBuf>, build: &str) -> Self {
        ReleaseError::InvalidManifest {
            path: path.into(),
            reason: format!("build '{}' lists no supported platforms", build),
        }
    }
}

/// Which of the two required project inputs is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    BuildSupport,
    PlatformNames,
}

impl InputKind {
    pub fn as_str(&self) -> &str {
        match self {
            InputKind::BuildSupport => "build support",
            InputKind::PlatformNames => "platform names",
        }
    }
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
