//! Profile directory loader
//!
//! Discovers profile documents under a directory and hands them to the
//! catalog in a deterministic order.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::catalog::{ProfileDocument, TypeCatalog};
use crate::error::CatalogLoadError;

/// Environment variable overriding the profile directory
pub const PROFILE_DIR_ENV: &str = "PROFILE_DIR";

/// Optional control file at the root of a profile directory
pub const CONTROL_FILE: &str = "_profile.yaml";

/// Contents of [`CONTROL_FILE`]
#[derive(Debug, Default, Deserialize)]
struct ProfileManifest {
    /// Paths relative to the profile directory, loaded first and in this order
    #[serde(default)]
    load_order: Vec<String>,
}

pub struct ProfileLoader {
    profile_dir: String,
}

impl ProfileLoader {
    pub fn new(profile_dir: impl Into<String>) -> Self {
        Self {
            profile_dir: profile_dir.into(),
        }
    }

    /// Create loader from PROFILE_DIR env var or fall back to known locations
    ///
    /// Path resolution order:
    /// 1. PROFILE_DIR environment variable (explicit override)
    /// 2. Relative "profiles" path (works when running from the repository root)
    /// 3. CARGO_MANIFEST_DIR/resources/profiles (set by cargo during build/test)
    /// 4. Compile-time crate directory (for test binaries run elsewhere)
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var(PROFILE_DIR_ENV) {
            return Self::new(dir);
        }

        if Path::new("profiles").is_dir() {
            return Self::new("profiles");
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let profile_path = format!("{}/resources/profiles", manifest_dir);
            if Path::new(&profile_path).is_dir() {
                return Self::new(profile_path);
            }
        }

        let compile_time_profiles = concat!(env!("CARGO_MANIFEST_DIR"), "/resources/profiles");
        if Path::new(compile_time_profiles).is_dir() {
            return Self::new(compile_time_profiles);
        }

        // Last resort - let loading fail with a clear error
        Self::new("profiles")
    }

    pub fn profile_dir_str(&self) -> &str {
        &self.profile_dir
    }

    pub fn profile_dir(&self) -> PathBuf {
        PathBuf::from(&self.profile_dir)
    }

    /// Load every profile document under the directory.
    ///
    /// Files named in the control file's `load_order` come first, in that
    /// order; the remaining files follow sorted by path. Files whose name
    /// starts with `_` are control files and never loaded as profiles.
    ///
    /// Every file is parsed even after one fails; all failures come back
    /// together as one [`CatalogLoadError`].
    pub fn load_documents(&self) -> Result<Vec<ProfileDocument>> {
        let root = self.profile_dir();
        info!("Loading profiles from {}", root.display());

        let manifest = self.load_manifest(&root)?;
        let mut remaining: Vec<PathBuf> = self
            .find_yaml_files(&root)?
            .into_iter()
            .filter(|path| !is_control_file(path))
            .collect();

        let mut ordered = Vec::with_capacity(remaining.len());
        for listed in &manifest.load_order {
            let path = root.join(listed);
            let index = remaining
                .iter()
                .position(|p| *p == path)
                .ok_or_else(|| {
                    anyhow!(
                        "{} lists '{}' in load_order but no such profile exists under {}",
                        CONTROL_FILE,
                        listed,
                        root.display()
                    )
                })?;
            ordered.push(remaining.remove(index));
        }
        ordered.extend(remaining);

        let mut documents = Vec::with_capacity(ordered.len());
        let mut failed = Vec::new();
        let mut errors = Vec::new();
        for path in ordered {
            let name = document_name(&root, &path);
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match ProfileDocument::from_yaml(name.as_str(), &content) {
                Ok(document) => {
                    debug!(
                        document = %document.name,
                        types = document.types.len(),
                        problems = document.problems.len(),
                        "Parsed profile document"
                    );
                    documents.push(document);
                }
                Err(err) => {
                    warn!(document = %name, "Profile document is not valid YAML");
                    errors.extend(err.errors);
                    failed.push(name);
                }
            }
        }
        if !errors.is_empty() {
            return Err(anyhow::Error::new(CatalogLoadError::new(errors)).context(format!(
                "Failed to parse {} under {}",
                failed.join(", "),
                root.display()
            )));
        }

        info!(
            "Loaded {} profile documents with {} type declarations",
            documents.len(),
            documents.iter().map(|d| d.types.len()).sum::<usize>()
        );
        Ok(documents)
    }

    /// Load the directory into a fresh catalog
    pub fn load_catalog(&self) -> Result<TypeCatalog> {
        let documents = self.load_documents()?;
        TypeCatalog::load(documents)
            .with_context(|| format!("Failed to build type catalog from {}", self.profile_dir))
    }

    /// Layer the directory's profiles on top of an existing catalog
    pub fn load_onto(&self, base: &TypeCatalog) -> Result<TypeCatalog> {
        let documents = self.load_documents()?;
        base.extend(documents)
            .with_context(|| format!("Failed to layer profiles from {}", self.profile_dir))
    }

    fn load_manifest(&self, root: &Path) -> Result<ProfileManifest> {
        let path = root.join(CONTROL_FILE);
        if !path.is_file() {
            return Ok(ProfileManifest::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        // An empty control file is allowed
        if content.trim().is_empty() {
            return Ok(ProfileManifest::default());
        }
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Recursively find all .yaml/.yml files in a directory, sorted
    fn find_yaml_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        #![allow(clippy::only_used_in_recursion)]
        let mut files = Vec::new();

        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                files.extend(self.find_yaml_files(&path)?);
            } else if path
                .extension()
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false)
            {
                files.push(path);
            }
        }

        // Sort for deterministic loading order
        files.sort();
        Ok(files)
    }
}

fn is_control_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('_'))
        .unwrap_or(false)
}

/// Path relative to the profile directory, with `/` separators
fn document_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_loader_creation() {
        let loader = ProfileLoader::new("profiles");
        assert_eq!(loader.profile_dir_str(), "profiles");
    }

    #[test]
    fn test_document_names_are_relative() {
        let root = Path::new("/srv/profiles");
        assert_eq!(
            document_name(root, Path::new("/srv/profiles/k8s/service.yaml")),
            "k8s/service.yaml"
        );
    }

    #[test]
    fn test_control_files_are_skipped() {
        assert!(is_control_file(Path::new("a/_profile.yaml")));
        assert!(is_control_file(Path::new("_draft.yml")));
        assert!(!is_control_file(Path::new("a/profile.yaml")));
    }

    #[test]
    fn test_load_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("ext")).unwrap();
        fs::write(
            dir.path().join(CONTROL_FILE),
            "load_order: [z_base.yaml]\n",
        )
        .unwrap();
        fs::write(dir.path().join("z_base.yaml"), "node_types: {Root: {}}\n").unwrap();
        fs::write(
            dir.path().join("ext/a.yaml"),
            "node_types: {Compute: {derived_from: Root}}\n",
        )
        .unwrap();
        fs::write(dir.path().join("b.yml"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a profile").unwrap();

        let loader = ProfileLoader::new(dir.path().to_string_lossy());
        let names: Vec<_> = loader
            .load_documents()
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["z_base.yaml", "b.yml", "ext/a.yaml"]);
    }

    #[test]
    fn test_missing_load_order_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONTROL_FILE), "load_order: [gone.yaml]\n").unwrap();

        let err = ProfileLoader::new(dir.path().to_string_lossy())
            .load_documents()
            .unwrap_err();
        assert!(err.to_string().contains("gone.yaml"));
    }

    #[test]
    fn test_missing_directory() {
        let err = ProfileLoader::new("/nonexistent/profiles")
            .load_documents()
            .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read directory"));
    }
}
