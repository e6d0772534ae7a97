use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};

/// Installer packages live in any `pkg` directory below the package root.
const PACKAGE_PATTERN: &str = "**/pkg/*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPackage {
    /// Path usable for reading the file (package root joined with `relative_path`)
    pub path: PathBuf,
    /// Path relative to the package root, `/`-separated; builds are matched against this
    pub relative_path: String,
}

impl LocalPackage {
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

pub struct PackageDiscovery {
    root: PathBuf,
}

impl PackageDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find every regular file matching `**/pkg/*` under the root. Hidden
    /// files and directories that cannot be read are skipped. The result is
    /// sorted by relative path.
    pub fn discover(&self) -> Result<LocalPackages> {
        let root = self.root.to_string_lossy();
        let pattern = format!("{}/{}", Pattern::escape(&root), PACKAGE_PATTERN);

        let options = MatchOptions {
            require_literal_leading_dot: true,
            ..MatchOptions::new()
        };

        let mut packages = Vec::new();
        for entry in glob::glob_with(&pattern, options)
            .with_context(|| format!("Invalid package glob pattern: {}", pattern))?
        {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    log::debug!("Skipping unreadable path {}: {}", e.path().display(), e.error());
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }

            let relative_path = self.relative_path(&path);
            packages.push(LocalPackage {
                path: self.root.join(&relative_path),
                relative_path,
            });
        }

        packages.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        log::debug!("Found {} local packages under {}", packages.len(), self.root.display());

        Ok(LocalPackages { packages })
    }

    fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);

        relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// The set of packages found on disk for this run.
#[derive(Debug, Clone, Default)]
pub struct LocalPackages {
    packages: Vec<LocalPackage>,
}

impl LocalPackages {
    pub fn new(mut packages: Vec<LocalPackage>) -> Self {
        packages.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Self { packages }
    }

    /// First package (in relative path order) whose path contains the build
    /// name. A short build name can match packages of other builds, e.g.
    /// `chef` also matches `chef-server-1.0.deb`; the lexicographic order only
    /// makes that choice repeatable, not correct.
    pub fn find_for_build(&self, build: &str) -> Option<&LocalPackage> {
        self.packages.iter().find(|p| p.relative_path.contains(build))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalPackage> {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
