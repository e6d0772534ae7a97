use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::manifest::ManifestLoader;
use crate::packages::PackageDiscovery;
use crate::release::{Release, ReleaseConfig};
use crate::upload::S3Uploader;

#[derive(Parser, Debug)]
#[command(name = "platform-release")]
#[command(about = "Upload built installer packages and publish the platform-support manifest")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// The project to release
    #[arg(short, long, value_name = "PROJECT")]
    pub project: String,

    /// The version of the installer to release
    #[arg(short = 'v', long, value_name = "VERSION")]
    pub version: String,

    /// The name of the s3 bucket to release to
    #[arg(short, long, value_name = "S3_BUCKET_NAME")]
    pub bucket: String,

    /// Continue the release if any build packages are missing
    #[arg(long)]
    pub ignore_missing_packages: bool,

    /// Also publish the platform-support manifest to the unscoped
    /// `platform-support/<version>.json` path read by older installers
    #[arg(long)]
    pub publish_legacy_path: bool,

    /// Directory holding <project>.json and <project>-platform-names.json
    /// [default: directory of this executable]
    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    /// Directory searched for built packages (`**/pkg/*`)
    #[arg(long, default_value = ".")]
    pub package_root: PathBuf,

    /// Where to write the generated platform-support manifest
    #[arg(long, default_value = "platform-support.json")]
    pub output: PathBuf,

    /// Command used to upload files
    #[arg(long, env = "RELEASE_UPLOAD_COMMAND", default_value = "s3cmd")]
    pub upload_command: String,

    /// Upload timeout in seconds
    #[arg(long, env = "RELEASE_UPLOAD_TIMEOUT", default_value_t = 1200)]
    pub upload_timeout: u64,
}

impl Cli {
    pub fn release_config(&self) -> ReleaseConfig {
        ReleaseConfig::new(&self.project, &self.version, &self.bucket)
            .ignore_missing_packages(self.ignore_missing_packages)
            .publish_legacy_path(self.publish_legacy_path)
            .output_path(&self.output)
    }

    fn resolve_manifest_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.manifest_dir {
            return Ok(dir.clone());
        }

        let exe = std::env::current_exe().context("Failed to locate the running executable")?;
        exe.parent()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Executable path has no parent: {}", exe.display()))
    }
}

pub fn run_cli(cli: Cli) -> Result<()> {
    let config = cli.release_config();

    let manifest_dir = cli.resolve_manifest_dir()?;
    let manifests = ManifestLoader::new(&manifest_dir).load(&config.project)?;

    let packages = PackageDiscovery::new(&cli.package_root)
        .discover()
        .context("Failed to discover local packages")?;

    println!(
        "Releasing {} {} ({} builds, {} local packages)",
        config.project,
        config.version,
        manifests.build_support.len(),
        packages.len()
    );

    let uploader = S3Uploader::locate(&cli.upload_command)?
        .timeout(Duration::from_secs(cli.upload_timeout));
    log::info!("Uploading with {}", uploader.program().display());

    let mut release = Release::new(&config, uploader);
    let output = release.run(
        &manifests.build_support,
        &packages,
        &manifests.platform_names,
    )?;

    println!(
        "Published {} platform entries for {} {}",
        output.len(),
        config.project,
        config.version
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_required_options() {
        let cli = Cli::try_parse_from([
            "platform-release",
            "-p",
            "chef",
            "-v",
            "11.0.0",
            "-b",
            "opscode-full-stack",
        ])
        .unwrap();

        assert_eq!(cli.project, "chef");
        assert_eq!(cli.version, "11.0.0");
        assert_eq!(cli.bucket, "opscode-full-stack");
        assert!(!cli.ignore_missing_packages);
        assert!(!cli.publish_legacy_path);
        assert_eq!(cli.package_root, PathBuf::from("."));
        assert_eq!(cli.output, PathBuf::from("platform-support.json"));
    }

    #[test]
    fn test_release_config_from_flags() {
        let cli = Cli::try_parse_from([
            "platform-release",
            "--project",
            "chef",
            "--version",
            "10.14.0",
            "--bucket",
            "b",
            "--ignore-missing-packages",
            "--publish-legacy-path",
            "--output",
            "out/support.json",
        ])
        .unwrap();

        let config = cli.release_config();
        assert!(config.ignore_missing_packages);
        assert!(config.publish_legacy_path);
        assert_eq!(config.output_path, PathBuf::from("out/support.json"));
        assert_eq!(
            config.platform_support_location().to_string(),
            "s3://b/chef-platform-support/10.14.0.json"
        );
    }

    #[test]
    fn test_missing_required_option() {
        let err = Cli::try_parse_from(["platform-release", "--project", "chef", "--version", "1.0"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
