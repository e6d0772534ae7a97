use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

use crate::error::ReleaseError;

/// Large packages can take a while to transfer.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// An object in a bucket, displayed as `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn new(bucket: impl Into<String>, key: impl AsRef<str>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.as_ref().trim_start_matches('/').to_string(),
        }
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub source: PathBuf,
    pub destination: S3Location,
    /// Make the object world-readable
    pub public: bool,
    /// Ask the uploader to print transfer progress
    pub progress: bool,
}

impl UploadRequest {
    /// A plain, private upload without progress output
    pub fn new(source: impl AsRef<Path>, destination: S3Location) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            destination,
            public: false,
            progress: false,
        }
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

/// Puts one local file into the object store. Returns once the object is
/// stored; any failure is an error.
pub trait Uploader {
    fn put(&mut self, request: &UploadRequest) -> Result<()>;
}

/// Uploads by running `s3cmd put` (or a compatible command) and streaming
/// its output to our own stdout/stderr.
pub struct S3Uploader {
    program: PathBuf,
    timeout: Duration,
}

impl S3Uploader {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    /// Resolve `command` on PATH.
    pub fn locate(command: &str) -> Result<Self> {
        let program = which::which(command).map_err(|_| ReleaseError::UploaderNotFound {
            command: command.to_string(),
        })?;

        log::debug!("Using upload command at {}", program.display());

        Ok(Self::new(program))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command_args(request: &UploadRequest) -> Vec<String> {
        let mut args = vec!["put".to_string()];

        if request.progress {
            args.push("--progress".to_string());
        }

        if request.public {
            args.push("--acl-public".to_string());
        }

        args.push(request.source.to_string_lossy().into_owned());
        args.push(request.destination.to_string());
        args
    }
}

impl Uploader for S3Uploader {
    fn put(&mut self, request: &UploadRequest) -> Result<()> {
        let destination = request.destination.to_string();

        let mut child = Command::new(&self.program)
            .args(Self::command_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to execute {}", self.program.display()))?;

        let status = match child
            .wait_timeout(self.timeout)
            .with_context(|| format!("Failed to wait for upload to {}", destination))?
        {
            Some(status) => status,
            None => {
                // Still running: kill and reap so no orphan keeps transferring.
                let _ = child.kill();
                let _ = child.wait();
                return Err(ReleaseError::UploadTimedOut {
                    destination,
                    timeout: self.timeout,
                }
                .into());
            }
        };

        if !status.success() {
            return Err(ReleaseError::UploadFailed {
                source_path: request.source.clone(),
                destination,
                status,
            }
            .into());
        }

        Ok(())
    }
}
