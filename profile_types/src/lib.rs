//! Profile Types - Level 1 Foundation Types
//!
//! Pure data structures describing the contents of a type profile: categories,
//! type definitions, and the property/attribute schema entries they declare.
//!
//! ## Architecture Level: LEVEL 1 (Foundation)
//!
//! Everything in `tosca_core` builds on these types, but this crate depends on
//! nothing else in the workspace.
//!
//! ## Critical Rules
//!
//! 1. **NO RESOLUTION LOGIC** - derivation, merging and validation live in `tosca_core`
//! 2. **NO FUNCTIONS** - except constructors, builders and accessors
//! 3. **SERIALIZABLE** - all types support serde
//! 4. **THREAD SAFE** - all types are Send + Sync

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Literal value as written in a profile document.
///
/// Defaults and constraint operands stay in their YAML form so that type
/// checking can tell `"true"` (a string) apart from `true` (a boolean).
pub use serde_yaml::Value as ProfileValue;

// ============================================================================
// TYPE CATEGORIES
// ============================================================================

/// A category of type definitions (`capability`, `node`, `policy`, `data`, ...).
///
/// Derivation never crosses categories: a `derived_from` reference always
/// names a type of the same category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeCategory(String);

impl TypeCategory {
    /// Suffix of the top-level document key holding a category's types
    pub const SECTION_SUFFIX: &'static str = "_types";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Category of the complex data types referenced by schema entries
    pub fn data() -> Self {
        Self::new("data")
    }

    pub fn capability() -> Self {
        Self::new("capability")
    }

    pub fn node() -> Self {
        Self::new("node")
    }

    pub fn policy() -> Self {
        Self::new("policy")
    }

    /// Parse a document section key such as `capability_types`.
    ///
    /// Returns `None` for keys that do not declare types.
    pub fn from_section_key(key: &str) -> Option<Self> {
        key.strip_suffix(Self::SECTION_SUFFIX)
            .filter(|name| !name.is_empty())
            .map(Self::new)
    }

    /// Document section key for this category (`capability` -> `capability_types`)
    pub fn section_key(&self) -> String {
        format!("{}{}", self.0, Self::SECTION_SUFFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for TypeCategory {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeCategory {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SCHEMA ENTRIES
// ============================================================================

/// Which schema map of a type an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Property,
    Attribute,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Property => "property",
            FieldKind::Attribute => "attribute",
        }
    }

    /// Document key of the schema map (`properties` / `attributes`)
    pub fn section_key(&self) -> &'static str {
        match self {
            FieldKind::Property => "properties",
            FieldKind::Attribute => "attributes",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Constraint operators understood by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintOperator {
    Equal,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    InRange,
    ValidValues,
    Length,
    MinLength,
    MaxLength,
    Pattern,
}

impl ConstraintOperator {
    pub const ALL: [ConstraintOperator; 11] = [
        ConstraintOperator::Equal,
        ConstraintOperator::GreaterThan,
        ConstraintOperator::GreaterOrEqual,
        ConstraintOperator::LessThan,
        ConstraintOperator::LessOrEqual,
        ConstraintOperator::InRange,
        ConstraintOperator::ValidValues,
        ConstraintOperator::Length,
        ConstraintOperator::MinLength,
        ConstraintOperator::MaxLength,
        ConstraintOperator::Pattern,
    ];

    /// Keyword used in documents (`valid_values`, `in_range`, ...)
    pub fn keyword(&self) -> &'static str {
        match self {
            ConstraintOperator::Equal => "equal",
            ConstraintOperator::GreaterThan => "greater_than",
            ConstraintOperator::GreaterOrEqual => "greater_or_equal",
            ConstraintOperator::LessThan => "less_than",
            ConstraintOperator::LessOrEqual => "less_or_equal",
            ConstraintOperator::InRange => "in_range",
            ConstraintOperator::ValidValues => "valid_values",
            ConstraintOperator::Length => "length",
            ConstraintOperator::MinLength => "min_length",
            ConstraintOperator::MaxLength => "max_length",
            ConstraintOperator::Pattern => "pattern",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.keyword() == keyword)
    }
}

impl std::fmt::Display for ConstraintOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// One constraint clause, e.g. `{valid_values: [a, b]}`.
///
/// The operand is kept raw; whether it is well-formed depends on the type of
/// the entry carrying the clause and is decided during catalog resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintClause {
    pub operator: ConstraintOperator,
    pub operand: ProfileValue,
}

impl ConstraintClause {
    pub fn new(operator: ConstraintOperator, operand: impl Into<ProfileValue>) -> Self {
        Self {
            operator,
            operand: operand.into(),
        }
    }

    /// `valid_values` clause over the given members
    pub fn valid_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ProfileValue>,
    {
        Self::new(
            ConstraintOperator::ValidValues,
            ProfileValue::Sequence(values.into_iter().map(Into::into).collect()),
        )
    }
}

/// Element schema of a collection entry (`list` / `map`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySchema {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ConstraintClause>,
}

impl EntrySchema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, clause: ConstraintClause) -> Self {
        self.constraints.push(clause);
        self
    }
}

/// One property or attribute declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    /// Unique within its owning map
    pub name: String,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_schema: Option<EntrySchema>,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ProfileValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ConstraintClause>,
}

impl SchemaEntry {
    /// Create a property entry (required unless stated otherwise)
    pub fn property(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            description: None,
            entry_schema: None,
            required: true,
            default: None,
            constraints: Vec::new(),
        }
    }

    /// Create an attribute entry; attributes are computed, never required
    pub fn attribute(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::property(name, type_name)
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<ProfileValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_entry_schema(mut self, entry_schema: EntrySchema) -> Self {
        self.entry_schema = Some(entry_schema);
        self
    }

    pub fn with_constraint(mut self, clause: ConstraintClause) -> Self {
        self.constraints.push(clause);
        self
    }
}

// ============================================================================
// TYPE DEFINITIONS
// ============================================================================

/// One named type as declared by a profile document.
///
/// This is the type's *own* declaration; the effective schema including
/// inherited entries is computed by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,
    /// Declaration order is preserved
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<SchemaEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<SchemaEntry>,
    /// Opaque to the catalog; read by plugin selection
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            derived_from: None,
            properties: Vec::new(),
            attributes: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn derived_from(mut self, parent: impl Into<String>) -> Self {
        self.derived_from = Some(parent.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_property(mut self, entry: SchemaEntry) -> Self {
        self.properties.push(entry);
        self
    }

    pub fn with_attribute(mut self, entry: SchemaEntry) -> Self {
        self.attributes.push(entry);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&SchemaEntry> {
        self.properties.iter().find(|e| e.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&SchemaEntry> {
        self.attributes.iter().find(|e| e.name == name)
    }

    /// Entries of the given kind, in declaration order
    pub fn entries(&self, kind: FieldKind) -> &[SchemaEntry] {
        match kind {
            FieldKind::Property => &self.properties,
            FieldKind::Attribute => &self.attributes,
        }
    }
}
