//! Uploading build packages and publishing the platform-support manifest.
//!
//! A release is strictly sequential and fail-fast: the first upload error
//! aborts the run, and uploads that already happened stay published.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::error::ReleaseError;
use crate::manifest::{BuildSupportManifest, OutputManifest, PlatformNames};
use crate::packages::LocalPackages;
use crate::upload::{S3Location, UploadRequest, Uploader};

#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    pub project: String,
    pub version: String,
    pub bucket: String,
    /// Skip builds without a local package instead of failing
    pub ignore_missing_packages: bool,
    /// Also publish the manifest to `platform-support/<version>.json`.
    /// Only needed until the downstream installer service reads the
    /// project-scoped location; delete together with `legacy_location`.
    pub publish_legacy_path: bool,
    /// Where `platform-support.json` is written before upload
    pub output_path: PathBuf,
}

impl ReleaseConfig {
    pub fn new(
        project: impl Into<String>,
        version: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            version: version.into(),
            bucket: bucket.into(),
            ignore_missing_packages: false,
            publish_legacy_path: false,
            output_path: PathBuf::from("platform-support.json"),
        }
    }

    pub fn ignore_missing_packages(mut self, ignore: bool) -> Self {
        self.ignore_missing_packages = ignore;
        self
    }

    pub fn publish_legacy_path(mut self, publish: bool) -> Self {
        self.publish_legacy_path = publish;
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn package_location(&self, location: &str) -> S3Location {
        S3Location::new(&self.bucket, location)
    }

    pub fn platform_support_location(&self) -> S3Location {
        S3Location::new(
            &self.bucket,
            format!("{}-platform-support/{}.json", self.project, self.version),
        )
    }

    pub fn platform_names_location(&self) -> S3Location {
        S3Location::new(
            &self.bucket,
            format!(
                "{}-platform-support/{}-platform-names.json",
                self.project, self.project
            ),
        )
    }

    pub fn legacy_location(&self) -> S3Location {
        S3Location::new(&self.bucket, format!("platform-support/{}.json", self.version))
    }
}

pub struct Release<'a, U: Uploader> {
    config: &'a ReleaseConfig,
    uploader: U,
}

impl<'a, U: Uploader> Release<'a, U> {
    pub fn new(config: &'a ReleaseConfig, uploader: U) -> Self {
        Self { config, uploader }
    }

    #[cfg(test)]
    pub fn into_uploader(self) -> U {
        self.uploader
    }

    /// Upload each build's package to its canonical platform directory and
    /// record every platform the build supports.
    pub fn upload_packages(
        &mut self,
        build_support: &BuildSupportManifest,
        packages: &LocalPackages,
    ) -> Result<OutputManifest> {
        let mut output = OutputManifest::new();

        for build in build_support.builds() {
            let canonical = build.canonical_platform().ok_or_else(|| {
                ReleaseError::no_platforms(format!("{}.json", self.config.project), &build.build)
            })?;

            let Some(package) = packages.find_for_build(&build.build) else {
                let err = ReleaseError::MissingPackage {
                    build: build.build.clone(),
                    platform: canonical.label(),
                };
                if self.config.ignore_missing_packages {
                    log::warn!("{}", err);
                    continue;
                }
                return Err(err.into());
            };

            let location = canonical.package_location(package.file_name());
            let request = UploadRequest::new(&package.path, self.config.package_location(&location))
                .public(true)
                .progress(true);

            println!("UPLOAD: {} -> {}", package.relative_path, location);
            self.uploader
                .put(&request)
                .with_context(|| format!("Failed to upload package for build '{}'", build.build))?;

            for platform in &build.platforms {
                output.record(platform, &self.config.version, &location);
            }
        }

        Ok(output)
    }

    /// Write the manifest locally, then upload it and the platform names file.
    pub fn publish(
        &mut self,
        output: &OutputManifest,
        platform_names: &PlatformNames,
    ) -> Result<()> {
        let config = self.config;
        let output_path = &config.output_path;
        output.write_to(output_path)?;

        self.upload_file(output_path, config.platform_support_location())?;
        self.upload_file(&platform_names.path, config.platform_names_location())?;

        if config.publish_legacy_path {
            self.upload_file(output_path, config.legacy_location())?;
        }

        Ok(())
    }

    pub fn run(
        &mut self,
        build_support: &BuildSupportManifest,
        packages: &LocalPackages,
        platform_names: &PlatformNames,
    ) -> Result<OutputManifest> {
        let output = self.upload_packages(build_support, packages)?;
        self.publish(&output, platform_names)?;
        Ok(output)
    }

    fn upload_file(&mut self, source: &Path, destination: S3Location) -> Result<()> {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());

        println!("UPLOAD: {} -> {}", file_name, destination);

        let request = UploadRequest::new(source, destination);
        self.uploader
            .put(&request)
            .with_context(|| format!("Failed to upload {}", source.display()))
    }
}
