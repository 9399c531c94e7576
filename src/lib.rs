//! tosca_core: type profile catalog and versioned grammar dispatch
//!
//! This crate contains the two mechanisms every reader of the orchestration
//! language depends on, with NO document I/O beyond the profile loader:
//! - Type catalog: derivation resolution, schema merge, default/constraint validation
//! - Schema value model: type checking of literals without coercion
//! - Grammar registry: per-version entity readers with field suppression
//! - Built-in profiles and the profile directory loader
//!
//! Both the catalog and the registry are immutable once built and can be
//! shared across threads.

pub mod catalog;
pub mod error;
pub mod grammar;
pub mod profiles;
pub mod schema;

// Re-export commonly used types
pub use catalog::{DocumentProblem, ProfileDocument, ResolvedType, TypeCatalog};
pub use error::{CatalogError, CatalogLoadError, GrammarError};
pub use grammar::{
    DocumentFieldError, EntityReader, Field, GrammarRegistry, GrammarRegistryBuilder, Problems,
    ReadContext,
};
pub use profiles::ProfileLoader;

// Re-export the data model crate
pub use profile_types::{
    ConstraintClause, ConstraintOperator, EntrySchema, FieldKind, ProfileValue, SchemaEntry,
    TypeCategory, TypeDefinition,
};
