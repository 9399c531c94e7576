//! Error types for catalog loading and grammar dispatch.
//!
//! Three classes of failure:
//!   - configuration (`GrammarError`): registry misconfiguration, fatal to the run
//!   - schema (`CatalogError`): bad profile input, collected and reported as a batch
//!   - document fields (`grammar::DocumentFieldError`): recorded per occurrence

use thiserror::Error;

use profile_types::{FieldKind, TypeCategory};

// ── Error codes ──────────────────────────────────────────────────
//
// Format: `{CLASS}:{GROUP}:{CODE}`
//   S:* schema errors raised while loading a catalog
//   C:* grammar configuration errors
//   D:* per-occurrence document field errors

/// `derived_from` names a type that is not declared in the category.
pub const S_REF_UNKNOWN_PARENT: &str = "S:REF:UNKNOWN_PARENT";
/// `derived_from` chain loops back on itself.
pub const S_REF_CYCLIC_DERIVATION: &str = "S:REF:CYCLIC_DERIVATION";
/// A `default` does not type-check or violates its own constraints.
pub const S_TYPE_INVALID_DEFAULT: &str = "S:TYPE:INVALID_DEFAULT";
/// A constraint clause is malformed for its entry's type.
pub const S_TYPE_INVALID_CONSTRAINT: &str = "S:TYPE:INVALID_CONSTRAINT";
/// Structural problem in a schema entry (e.g. missing `entry_schema`).
pub const S_TYPE_INVALID_SCHEMA: &str = "S:TYPE:INVALID_SCHEMA";
/// The same document declares a type name twice in one category.
pub const S_DOC_DUPLICATE_TYPE: &str = "S:DOC:DUPLICATE_TYPE";
/// A document does not have the expected shape.
pub const S_DOC_MALFORMED: &str = "S:DOC:MALFORMED";

/// No reader bound for a (version, entity kind) pair.
pub const C_GRAMMAR_UNKNOWN_READER: &str = "C:GRAMMAR:UNKNOWN_READER";
/// A (version, entity kind) pair was bound twice.
pub const C_GRAMMAR_DUPLICATE_READER: &str = "C:GRAMMAR:DUPLICATE_READER";
/// A document declares a grammar version nobody registered.
pub const C_GRAMMAR_UNKNOWN_VERSION: &str = "C:GRAMMAR:UNKNOWN_VERSION";

/// A field that exists in the grammar but not in the document's version.
pub const D_FIELD_UNSUPPORTED: &str = "D:FIELD:UNSUPPORTED";
/// A field no grammar version knows.
pub const D_FIELD_UNKNOWN: &str = "D:FIELD:UNKNOWN";
/// A required field is absent.
pub const D_FIELD_MISSING: &str = "D:FIELD:MISSING";
/// A field value has the wrong shape.
pub const D_FIELD_INVALID: &str = "D:FIELD:INVALID";

/// A single problem found while building a type catalog
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("{category} type '{type_name}' is derived from unknown type '{parent}'")]
    UnknownParent {
        category: TypeCategory,
        type_name: String,
        parent: String,
    },

    #[error("cyclic derivation among {category} types: {}", .members.join(" -> "))]
    CyclicDerivation {
        category: TypeCategory,
        members: Vec<String>,
    },

    #[error("invalid default for {kind} '{field}' of {category} type '{type_name}': {reason}")]
    InvalidDefault {
        category: TypeCategory,
        type_name: String,
        kind: FieldKind,
        field: String,
        reason: String,
    },

    #[error("invalid constraint on {kind} '{field}' of {category} type '{type_name}': {reason}")]
    InvalidConstraint {
        category: TypeCategory,
        type_name: String,
        kind: FieldKind,
        field: String,
        reason: String,
    },

    #[error("invalid schema for {kind} '{field}' of {category} type '{type_name}': {reason}")]
    InvalidSchema {
        category: TypeCategory,
        type_name: String,
        kind: FieldKind,
        field: String,
        reason: String,
    },

    #[error("document '{document}' declares {category} type '{type_name}' more than once")]
    DuplicateCategoryTypeInSameDocument {
        document: String,
        category: TypeCategory,
        type_name: String,
    },

    #[error("malformed document '{document}' at {path}: {reason}")]
    MalformedDocument {
        document: String,
        path: String,
        reason: String,
    },
}

impl CatalogError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownParent { .. } => S_REF_UNKNOWN_PARENT,
            Self::CyclicDerivation { .. } => S_REF_CYCLIC_DERIVATION,
            Self::InvalidDefault { .. } => S_TYPE_INVALID_DEFAULT,
            Self::InvalidConstraint { .. } => S_TYPE_INVALID_CONSTRAINT,
            Self::InvalidSchema { .. } => S_TYPE_INVALID_SCHEMA,
            Self::DuplicateCategoryTypeInSameDocument { .. } => S_DOC_DUPLICATE_TYPE,
            Self::MalformedDocument { .. } => S_DOC_MALFORMED,
        }
    }

    /// Category the error belongs to; `None` for document-shape errors
    pub fn category(&self) -> Option<&TypeCategory> {
        match self {
            Self::UnknownParent { category, .. }
            | Self::CyclicDerivation { category, .. }
            | Self::InvalidDefault { category, .. }
            | Self::InvalidConstraint { category, .. }
            | Self::InvalidSchema { category, .. }
            | Self::DuplicateCategoryTypeInSameDocument { category, .. } => Some(category),
            Self::MalformedDocument { .. } => None,
        }
    }
}

/// Batch of errors from one `load` call, in deterministic order
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("catalog load failed: {} error(s)", .errors.len())]
pub struct CatalogLoadError {
    pub errors: Vec<CatalogError>,
}

impl CatalogLoadError {
    pub fn new(errors: Vec<CatalogError>) -> Self {
        Self { errors }
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.errors.iter().map(CatalogError::code).collect()
    }
}

/// Grammar registry misconfiguration. Never caused by document content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("no reader registered for entity kind '{kind}' in grammar version '{version}'")]
    UnknownReader { version: String, kind: String },

    #[error("reader for entity kind '{kind}' in grammar version '{version}' registered twice")]
    DuplicateReader { version: String, kind: String },

    #[error("unknown grammar version '{0}'")]
    UnknownVersion(String),
}

impl GrammarError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownReader { .. } => C_GRAMMAR_UNKNOWN_READER,
            Self::DuplicateReader { .. } => C_GRAMMAR_DUPLICATE_READER,
            Self::UnknownVersion(_) => C_GRAMMAR_UNKNOWN_VERSION,
        }
    }
}
