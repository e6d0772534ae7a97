use anyhow::{Context, Result};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{InputKind, ReleaseError};
use crate::platform::PlatformTuple;

/// A build declared in the build support manifest together with every
/// platform it supports. By convention the first platform is the one the
/// build was produced on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSupport {
    pub build: String,
    pub platforms: Vec<PlatformTuple>,
}

impl BuildSupport {
    pub fn canonical_platform(&self) -> Option<&PlatformTuple> {
        self.platforms.first()
    }
}

/// Build name -> supported platforms, in the order the file lists them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSupportManifest {
    builds: Vec<BuildSupport>,
}

impl BuildSupportManifest {
    pub fn new(builds: Vec<BuildSupport>) -> Self {
        Self { builds }
    }

    pub fn builds(&self) -> &[BuildSupport] {
        &self.builds
    }

    pub fn len(&self) -> usize {
        self.builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }
}

impl<'de> Deserialize<'de> for BuildSupportManifest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ManifestVisitor;

        impl<'de> Visitor<'de> for ManifestVisitor {
            type Value = BuildSupportManifest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of build names to lists of [platform, version, arch]")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut builds: Vec<BuildSupport> =
                    Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((build, platforms)) =
                    map.next_entry::<String, Vec<PlatformTuple>>()?
                {
                    // A repeated build name keeps its first position and its last value.
                    match builds.iter_mut().find(|b| b.build == build) {
                        Some(existing) => existing.platforms = platforms,
                        None => builds.push(BuildSupport { build, platforms }),
                    }
                }
                Ok(BuildSupportManifest { builds })
            }
        }

        deserializer.deserialize_map(ManifestVisitor)
    }
}

/// The platform-name lookup file. Its content is opaque to the release: it
/// is only checked to be JSON and then uploaded as-is.
#[derive(Debug, Clone)]
pub struct PlatformNames {
    pub path: PathBuf,
}

/// Both required inputs for a project.
#[derive(Debug, Clone)]
pub struct ProjectManifests {
    pub build_support: BuildSupportManifest,
    pub platform_names: PlatformNames,
}

pub struct ManifestLoader {
    manifest_dir: PathBuf,
}

impl ManifestLoader {
    pub fn new(manifest_dir: impl AsRef<Path>) -> Self {
        Self {
            manifest_dir: manifest_dir.as_ref().to_path_buf(),
        }
    }

    pub fn build_support_path(&self, project: &str) -> PathBuf {
        self.manifest_dir.join(format!("{}.json", project))
    }

    pub fn platform_names_path(&self, project: &str) -> PathBuf {
        self.manifest_dir.join(format!("{}-platform-names.json", project))
    }

    pub fn load(&self, project: &str) -> Result<ProjectManifests> {
        let build_support_path = self.build_support_path(project);
        require_input(&build_support_path, InputKind::BuildSupport, project)?;

        let platform_names_path = self.platform_names_path(project);
        require_input(&platform_names_path, InputKind::PlatformNames, project)?;

        let build_support = read_build_support(&build_support_path)?;

        let names_content = fs::read_to_string(&platform_names_path)
            .with_context(|| format!("Failed to read {}", platform_names_path.display()))?;
        serde_json::from_str::<serde_json::Value>(&names_content).with_context(|| {
            format!(
                "Failed to parse platform names JSON from {}",
                platform_names_path.display()
            )
        })?;

        log::debug!(
            "Loaded {} builds from {}",
            build_support.len(),
            build_support_path.display()
        );

        Ok(ProjectManifests {
            build_support,
            platform_names: PlatformNames {
                path: platform_names_path,
            },
        })
    }
}

fn require_input(path: &Path, kind: InputKind, project: &str) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }

    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    Err(ReleaseError::MissingInput {
        kind,
        project: project.to_string(),
        path,
    }
    .into())
}

fn read_build_support(path: &Path) -> Result<BuildSupportManifest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let manifest: BuildSupportManifest = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse build support JSON from {}", path.display()))?;

    if let Some(empty) = manifest.builds().iter().find(|b| b.platforms.is_empty()) {
        return Err(ReleaseError::no_platforms(path, &empty.build).into());
    }

    Ok(manifest)
}

type ReleaseMap = BTreeMap<String, String>;
type ArchitectureMap = BTreeMap<String, ReleaseMap>;
type VersionMap = BTreeMap<String, ArchitectureMap>;

/// The published platform-support manifest:
/// platform -> platform version -> architecture -> release version -> location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputManifest {
    platforms: BTreeMap<String, VersionMap>,
}

impl OutputManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `location` for `platform` at `release_version`, overwriting
    /// whatever an earlier build recorded for the same key.
    pub fn record(&mut self, platform: &PlatformTuple, release_version: &str, location: &str) {
        self.platforms
            .entry(platform.platform().to_string())
            .or_default()
            .entry(platform.platform_version().to_string())
            .or_default()
            .entry(platform.machine_architecture().to_string())
            .or_default()
            .insert(release_version.to_string(), location.to_string());
    }

    pub fn get(&self, platform: &PlatformTuple, release_version: &str) -> Option<&str> {
        self.platforms
            .get(platform.platform())?
            .get(platform.platform_version())?
            .get(platform.machine_architecture())?
            .get(release_version)
            .map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// Number of recorded leaves
    pub fn len(&self) -> usize {
        self.platforms
            .values()
            .flat_map(|versions| versions.values())
            .flat_map(|arches| arches.values())
            .map(|releases| releases.len())
            .sum()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .context("Failed to serialize platform support manifest to JSON")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut json = self.to_json_pretty()?;
        json.push('\n');

        fs::write(path, json).with_context(|| {
            format!("Failed to write platform support manifest to {}", path.display())
        })?;

        println!("Generated manifest: {}", path.display());

        Ok(())
    }

    #[cfg(test)]
    pub fn read_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest JSON from {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_inputs(dir: &Path, project: &str, build_support: &str) {
        fs::write(dir.join(format!("{}.json", project)), build_support).unwrap();
        fs::write(
            dir.join(format!("{}-platform-names.json", project)),
            r#"{"el": "Enterprise Linux", "ubuntu": "Ubuntu"}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_build_order_follows_document() {
        let manifest: BuildSupportManifest = serde_json::from_str(
            r#"{
                "zeta": [["ubuntu", "12.04", "x86_64"]],
                "alpha": [["el", "6", "x86_64"], ["el", "5", "x86_64"]],
                "mid": [["mac_os_x", "10.7", "x86_64"]]
            }"#,
        )
        .unwrap();

        let names: Vec<&str> = manifest.builds().iter().map(|b| b.build.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(
            manifest.builds()[1].canonical_platform(),
            Some(&PlatformTuple::new("el", "6", "x86_64"))
        );
        assert_eq!(manifest.builds()[1].platforms.len(), 2);
    }

    #[test]
    fn test_repeated_build_keeps_first_position_last_value() {
        let manifest: BuildSupportManifest = serde_json::from_str(
            r#"{
                "foo": [["ubuntu", "10.04", "x86_64"]],
                "bar": [["el", "6", "x86_64"]],
                "foo": [["ubuntu", "12.04", "x86_64"]]
            }"#,
        )
        .unwrap();

        let names: Vec<&str> = manifest.builds().iter().map(|b| b.build.as_str()).collect();
        assert_eq!(names, vec!["foo", "bar"]);
        assert_eq!(
            manifest.builds()[0].platforms,
            vec![PlatformTuple::new("ubuntu", "12.04", "x86_64")]
        );
    }

    #[test]
    fn test_load_project_manifests() {
        let dir = TempDir::new().unwrap();
        write_inputs(dir.path(), "chef", r#"{"foo": [["ubuntu", "12.04", "x86_64"]]}"#);

        let loaded = ManifestLoader::new(dir.path()).load("chef").unwrap();

        assert_eq!(loaded.build_support.len(), 1);
        assert_eq!(loaded.platform_names.path, dir.path().join("chef-platform-names.json"));
    }

    #[test]
    fn test_platform_names_must_be_json() {
        let dir = TempDir::new().unwrap();
        write_inputs(dir.path(), "chef", r#"{"foo": [["ubuntu", "12.04", "x86_64"]]}"#);
        fs::write(dir.path().join("chef-platform-names.json"), "not json").unwrap();

        let err = ManifestLoader::new(dir.path()).load("chef").unwrap_err();

        assert!(err.to_string().contains("Failed to parse platform names JSON"));
    }

    #[test]
    fn test_missing_build_support_file() {
        let dir = TempDir::new().unwrap();

        let err = ManifestLoader::new(dir.path()).load("chef").unwrap_err();

        match err.downcast_ref::<ReleaseError>() {
            Some(ReleaseError::MissingInput { kind, project, path }) => {
                assert_eq!(*kind, InputKind::BuildSupport);
                assert_eq!(project, "chef");
                assert!(path.is_absolute());
                assert!(path.ends_with("chef.json"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_platform_names_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("chef.json"), "{}").unwrap();

        let err = ManifestLoader::new(dir.path()).load("chef").unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::MissingInput { kind: InputKind::PlatformNames, .. })
        ));
        assert!(err.to_string().contains("chef-platform-names.json"));
    }

    #[test]
    fn test_build_without_platforms_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_inputs(dir.path(), "chef", r#"{"foo": []}"#);

        let err = ManifestLoader::new(dir.path()).load("chef").unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::InvalidManifest { .. })
        ));
    }

    #[test]
    fn test_record_creates_nested_levels() {
        let mut output = OutputManifest::new();
        output.record(
            &PlatformTuple::new("ubuntu", "12.04", "x86_64"),
            "1.0",
            "/ubuntu/12.04/x86_64/foo-1.0.deb",
        );

        let json: serde_json::Value =
            serde_json::from_str(&output.to_json_pretty().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ubuntu": {"12.04": {"x86_64": {"1.0": "/ubuntu/12.04/x86_64/foo-1.0.deb"}}}
            })
        );
    }

    #[test]
    fn test_record_last_write_wins() {
        let tuple = PlatformTuple::new("el", "6", "x86_64");
        let mut output = OutputManifest::new();

        output.record(&tuple, "1.0", "/el/6/x86_64/first.rpm");
        output.record(&tuple, "1.0", "/el/6/x86_64/second.rpm");

        assert_eq!(output.get(&tuple, "1.0"), Some("/el/6/x86_64/second.rpm"));
        assert_eq!(output.len(), 1);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("platform-support.json");

        let mut output = OutputManifest::new();
        output.record(&PlatformTuple::new("el", "6", "x86_64"), "11.0.0", "/el/6/x86_64/chef.rpm");
        output.record(&PlatformTuple::new("el", "5", "x86_64"), "11.0.0", "/el/6/x86_64/chef.rpm");
        output.record(
            &PlatformTuple::new("ubuntu", "12.04", "i686"),
            "11.0.0",
            "/ubuntu/12.04/i686/chef.deb",
        );
        output.write_to(&path).unwrap();

        assert_eq!(OutputManifest::read_from(&path).unwrap(), output);
    }
}
