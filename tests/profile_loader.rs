//! Integration tests for loading profile directories

use std::fs;

use pretty_assertions::assert_eq;
use tosca_core::error::{S_DOC_MALFORMED, S_REF_UNKNOWN_PARENT, S_TYPE_INVALID_SCHEMA};
use tosca_core::profiles::builtin_catalog;
use tosca_core::{CatalogLoadError, ProfileLoader};

const SHIPPED: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/resources/profiles");

#[test]
fn test_shipped_directory_matches_builtin_catalog() {
    let from_disk = ProfileLoader::new(SHIPPED).load_catalog().unwrap();
    let builtin = builtin_catalog().unwrap();

    assert_eq!(from_disk.len(), builtin.len());
    assert_eq!(from_disk.to_json().unwrap(), builtin.to_json().unwrap());
}

#[test]
fn test_shipped_directory_document_order() {
    let names: Vec<_> = ProfileLoader::new(SHIPPED)
        .load_documents()
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["common.yaml", "kubernetes.yaml"]);
}

#[test]
fn test_site_profiles_layer_onto_builtins() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("site.yaml"),
        r#"
tosca_definitions_version: tosca_2_0
capability_types:
  LoadBalancer:
    derived_from: NodePort
    properties:
      type: {type: string, default: LoadBalancer}
      vendor: {type: string, default: acme}
  AcmeBalancer:
    derived_from: LoadBalancer
"#,
    )
    .unwrap();

    let base = builtin_catalog().unwrap();
    let layered = ProfileLoader::new(dir.path().to_string_lossy())
        .load_onto(&base)
        .unwrap();

    let acme = layered.resolve("capability", "AcmeBalancer").unwrap();
    assert!(acme.property("vendor").is_some());
    // The redeclared LoadBalancer no longer carries its own attribute
    assert!(acme.attribute("healthCheckNodePort").is_none());
    assert!(acme.attribute("nodePort").is_some());

    // The base catalog is unchanged
    assert!(base
        .resolve("capability", "LoadBalancer")
        .unwrap()
        .attribute("healthCheckNodePort")
        .is_some());
    assert!(base.resolve("capability", "AcmeBalancer").is_none());
}

#[test]
fn test_catalog_errors_survive_context() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("broken.yaml"),
        "node_types:\n  Web: {derived_from: Server}\n",
    )
    .unwrap();

    let err = ProfileLoader::new(dir.path().to_string_lossy())
        .load_catalog()
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to build type catalog"));

    let load_error = err.downcast_ref::<CatalogLoadError>().unwrap();
    assert_eq!(load_error.codes(), vec![S_REF_UNKNOWN_PARENT]);
}

#[test]
fn test_unparseable_profile_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bad.yaml"), "node_types: [unclosed").unwrap();

    let err = ProfileLoader::new(dir.path().to_string_lossy())
        .load_documents()
        .unwrap_err();
    assert!(format!("{err:#}").contains("bad.yaml"));
}

#[test]
fn test_every_unparseable_profile_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.yaml"), "node_types: [unclosed").unwrap();
    fs::write(dir.path().join("b.yaml"), "node_types: {Root: {}}\n").unwrap();
    fs::write(dir.path().join("c.yaml"), "capability_types: {Port: [").unwrap();

    let err = ProfileLoader::new(dir.path().to_string_lossy())
        .load_catalog()
        .unwrap_err();
    assert!(err.to_string().contains("a.yaml, c.yaml"));

    let load_error = err.downcast_ref::<CatalogLoadError>().unwrap();
    assert_eq!(load_error.codes(), vec![S_DOC_MALFORMED, S_DOC_MALFORMED]);
    let documents: Vec<_> = load_error
        .errors
        .iter()
        .map(|e| match e {
            tosca_core::CatalogError::MalformedDocument { document, .. } => document.as_str(),
            other => panic!("unexpected error: {other}"),
        })
        .collect();
    assert_eq!(documents, vec!["a.yaml", "c.yaml"]);
}

#[test]
fn test_shape_problems_across_files_form_one_batch() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a.yaml"),
        "node_types:\n  Root:\n    properties:\n      p: {default: 1}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("b.yaml"),
        "node_types:\n  Web: {derived_from: Server}\n",
    )
    .unwrap();

    let err = ProfileLoader::new(dir.path().to_string_lossy())
        .load_catalog()
        .unwrap_err();
    let load_error = err.downcast_ref::<CatalogLoadError>().unwrap();
    assert_eq!(
        load_error.codes(),
        vec![S_TYPE_INVALID_SCHEMA, S_REF_UNKNOWN_PARENT]
    );
}
