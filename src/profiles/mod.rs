//! Built-in profiles and the profile directory loader
//!
//! Built-in profiles are plain YAML under `resources/profiles`, embedded at
//! compile time and fed through the same [`TypeCatalog::load`] path as any
//! other document.

pub mod loader;

use crate::catalog::{ProfileDocument, TypeCatalog};
use crate::error::CatalogLoadError;

pub use loader::{ProfileLoader, CONTROL_FILE, PROFILE_DIR_ENV};

/// Embedded profiles in load order
const BUILTIN_PROFILES: &[(&str, &str)] = &[
    (
        "common.yaml",
        include_str!("../../resources/profiles/common.yaml"),
    ),
    (
        "kubernetes.yaml",
        include_str!("../../resources/profiles/kubernetes.yaml"),
    ),
];

/// Names of the embedded profiles, in load order
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_PROFILES.iter().map(|(name, _)| *name)
}

/// Parse every embedded profile; unreadable ones are reported together
pub fn builtin_documents() -> Result<Vec<ProfileDocument>, CatalogLoadError> {
    let mut documents = Vec::with_capacity(BUILTIN_PROFILES.len());
    let mut errors = Vec::new();
    for (name, text) in BUILTIN_PROFILES {
        match ProfileDocument::from_yaml(*name, text) {
            Ok(document) => documents.push(document),
            Err(err) => errors.extend(err.errors),
        }
    }
    if errors.is_empty() {
        Ok(documents)
    } else {
        Err(CatalogLoadError::new(errors))
    }
}

/// Catalog of the embedded profiles alone
pub fn builtin_catalog() -> Result<TypeCatalog, CatalogLoadError> {
    TypeCatalog::load(builtin_documents()?)
}
