//! Type Catalog
//!
//! Ingests profile documents and resolves every declared type into its
//! effective schema: the parent's effective properties and attributes with the
//! type's own entries applied on top.
//!
//! ## Pipeline
//!
//! ```text
//! documents ─► ingest (redeclarations replace in place)
//!           ─► resolve per category (topological sweeps, cycle detection)
//!           ─► validate own entries (defaults, constraints)
//!           ─► TypeCatalog (immutable, Send + Sync)
//! ```
//!
//! All problems found along the way are returned together as a
//! [`CatalogLoadError`], ordered by category and then by declaration position.

pub mod document;
mod resolve;
mod validate;

use std::collections::{BTreeMap, HashMap};

use profile_types::{SchemaEntry, TypeCategory, TypeDefinition};
use serde::Serialize;
use tracing::{debug, info};

pub use document::{DocumentProblem, ProfileDocument};

use crate::error::{CatalogError, CatalogLoadError};
use crate::schema::DataTypeLookup;

// ============================================================================
// Declarations
// ============================================================================

/// A type declaration together with the document that declared it
#[derive(Debug, Clone)]
pub(crate) struct Declaration {
    pub document: String,
    pub definition: TypeDefinition,
}

/// Declarations of one category in resolution order
#[derive(Debug, Clone, Default)]
pub(crate) struct CategoryDeclarations {
    entries: Vec<Declaration>,
    index: HashMap<String, usize>,
}

impl CategoryDeclarations {
    /// Add a declaration; a redeclared name replaces the earlier declaration
    /// and keeps its position. Returns the replaced declaration, if any.
    pub fn declare(&mut self, declaration: Declaration) -> Option<Declaration> {
        match self.index.get(&declaration.definition.name).copied() {
            Some(position) => Some(std::mem::replace(&mut self.entries[position], declaration)),
            None => {
                self.index
                    .insert(declaration.definition.name.clone(), self.entries.len());
                self.entries.push(declaration);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.index.get(name).map(|&position| &self.entries[position])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Declaration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Resolved types
// ============================================================================

/// A type with its effective schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedType {
    pub category: TypeCategory,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,
    /// Document holding the winning declaration
    pub document: String,
    /// Effective properties: inherited order first, then new own entries
    pub properties: Vec<SchemaEntry>,
    pub attributes: Vec<SchemaEntry>,
    /// The type's own metadata; never inherited
    pub metadata: BTreeMap<String, String>,
    /// Parent first, root last
    pub ancestry: Vec<String>,
    #[serde(skip)]
    own: TypeDefinition,
}

impl ResolvedType {
    fn root(category: TypeCategory, declaration: &Declaration) -> Self {
        let own = &declaration.definition;
        Self {
            category,
            name: own.name.clone(),
            description: own.description.clone(),
            derived_from: None,
            document: declaration.document.clone(),
            properties: resolve::merge_entries(&[], &own.properties),
            attributes: resolve::merge_entries(&[], &own.attributes),
            metadata: own.metadata.clone(),
            ancestry: Vec::new(),
            own: own.clone(),
        }
    }

    fn child(parent: &ResolvedType, declaration: &Declaration) -> Self {
        let own = &declaration.definition;
        let mut ancestry = Vec::with_capacity(parent.ancestry.len() + 1);
        ancestry.push(parent.name.clone());
        ancestry.extend(parent.ancestry.iter().cloned());
        Self {
            category: parent.category.clone(),
            name: own.name.clone(),
            description: own.description.clone(),
            derived_from: Some(parent.name.clone()),
            document: declaration.document.clone(),
            properties: resolve::merge_entries(&parent.properties, &own.properties),
            attributes: resolve::merge_entries(&parent.attributes, &own.attributes),
            metadata: own.metadata.clone(),
            ancestry,
            own: own.clone(),
        }
    }

    /// Effective property by name
    pub fn property(&self, name: &str) -> Option<&SchemaEntry> {
        self.properties.iter().find(|e| e.name == name)
    }

    /// Effective attribute by name
    pub fn attribute(&self, name: &str) -> Option<&SchemaEntry> {
        self.attributes.iter().find(|e| e.name == name)
    }

    pub fn ancestry(&self) -> &[String] {
        &self.ancestry
    }

    /// The declaration this type was resolved from
    pub fn own(&self) -> &TypeDefinition {
        &self.own
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, Default)]
struct CategoryTable {
    /// Resolved names in declaration order
    order: Vec<String>,
    types: HashMap<String, ResolvedType>,
}

/// Resolved registry of types across all categories.
///
/// Immutable once built; share it freely between threads.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    declarations: BTreeMap<TypeCategory, CategoryDeclarations>,
    categories: BTreeMap<TypeCategory, CategoryTable>,
}

impl TypeCatalog {
    /// Build a catalog from documents, in the order they are supplied.
    ///
    /// Later documents override earlier declarations of the same type name.
    pub fn load<I>(documents: I) -> Result<Self, CatalogLoadError>
    where
        I: IntoIterator<Item = ProfileDocument>,
    {
        Self::build(BTreeMap::new(), documents)
    }

    /// Layer more documents on top of this catalog.
    ///
    /// `self` is left untouched. Redeclared types replace the base declaration
    /// and base types deriving from them are resolved again against it.
    pub fn extend<I>(&self, documents: I) -> Result<Self, CatalogLoadError>
    where
        I: IntoIterator<Item = ProfileDocument>,
    {
        Self::build(self.declarations.clone(), documents)
    }

    fn build<I>(
        mut declarations: BTreeMap<TypeCategory, CategoryDeclarations>,
        documents: I,
    ) -> Result<Self, CatalogLoadError>
    where
        I: IntoIterator<Item = ProfileDocument>,
    {
        let mut errors: BTreeMap<TypeCategory, Vec<(usize, CatalogError)>> = BTreeMap::new();
        // Document-shape problems outside any declaration come first
        let mut unscoped: Vec<CatalogError> = Vec::new();
        let mut document_count = 0usize;

        // ── Ingest ───────────────────────────────────────────────────
        for document in documents {
            document_count += 1;
            let mut seen: HashMap<&TypeCategory, Vec<&str>> = HashMap::new();
            for (category, definition) in &document.types {
                let names = seen.entry(category).or_default();
                let table = declarations.entry(category.clone()).or_default();
                if names.contains(&definition.name.as_str()) {
                    let position = table.position(&definition.name).unwrap_or(usize::MAX);
                    errors.entry(category.clone()).or_default().push((
                        position,
                        CatalogError::DuplicateCategoryTypeInSameDocument {
                            document: document.name.clone(),
                            category: category.clone(),
                            type_name: definition.name.clone(),
                        },
                    ));
                    continue;
                }
                names.push(&definition.name);

                let replaced = table.declare(Declaration {
                    document: document.name.clone(),
                    definition: definition.clone(),
                });
                if let Some(replaced) = replaced {
                    debug!(
                        category = %category,
                        type_name = %definition.name,
                        previous = %replaced.document,
                        document = %document.name,
                        "Type redeclared; later declaration wins"
                    );
                }
            }

            for problem in &document.problems {
                let Some((category, type_name)) = &problem.scope else {
                    unscoped.push(problem.error.clone());
                    continue;
                };
                let position = declarations
                    .get(category)
                    .and_then(|table| table.position(type_name))
                    .unwrap_or(usize::MAX);
                errors
                    .entry(category.clone())
                    .or_default()
                    .push((position, problem.error.clone()));
            }
        }

        // ── Resolve ──────────────────────────────────────────────────
        let mut catalog = TypeCatalog {
            declarations: BTreeMap::new(),
            categories: BTreeMap::new(),
        };
        for (category, decls) in &declarations {
            let resolution = resolve::resolve_category(category, decls);
            errors.entry(category.clone()).or_default().extend(resolution.errors);

            let mut types = resolution.types;
            let mut table = CategoryTable::default();
            for declaration in decls.iter() {
                let name = &declaration.definition.name;
                if let Some(resolved) = types.remove(name) {
                    table.order.push(name.clone());
                    table.types.insert(name.clone(), resolved);
                }
            }
            catalog.categories.insert(category.clone(), table);
        }

        // ── Validate ─────────────────────────────────────────────────
        // Complex data types are looked up in the resolved catalog, so every
        // category is resolved before any entry is validated.
        catalog.declarations = declarations;
        for (category, decls) in &catalog.declarations {
            for (position, declaration) in decls.iter().enumerate() {
                if catalog.resolve(category.as_str(), &declaration.definition.name).is_none() {
                    continue;
                }
                if let Err(error) =
                    validate::validate_type(&catalog, category, &declaration.definition)
                {
                    errors.entry(category.clone()).or_default().push((position, error));
                }
            }
        }

        let mut batch = unscoped;
        for (_, mut category_errors) in errors {
            category_errors.sort_by_key(|(position, _)| *position);
            batch.extend(category_errors.into_iter().map(|(_, error)| error));
        }
        if !batch.is_empty() {
            return Err(CatalogLoadError::new(batch));
        }

        info!(
            documents = document_count,
            categories = catalog.categories.len(),
            types = catalog.len(),
            "Type catalog loaded"
        );
        Ok(catalog)
    }

    /// Effective type, or `None` if the name is not declared in the category
    pub fn resolve(&self, category: &str, name: &str) -> Option<&ResolvedType> {
        self.categories.get(category)?.types.get(name)
    }

    /// Types of a category in declaration order
    pub fn types<'a>(&'a self, category: &str) -> impl Iterator<Item = &'a ResolvedType> + 'a {
        self.categories
            .get(category)
            .into_iter()
            .flat_map(|table| table.order.iter().filter_map(move |name| table.types.get(name)))
    }

    /// Categories with at least one declared type, sorted by name
    pub fn categories(&self) -> impl Iterator<Item = &TypeCategory> {
        self.categories.keys()
    }

    /// Whether `name` derives (directly or transitively) from `ancestor`.
    /// A type does not derive from itself.
    pub fn is_derived_from(&self, category: &str, name: &str, ancestor: &str) -> bool {
        self.resolve(category, name)
            .is_some_and(|t| t.ancestry.iter().any(|a| a == ancestor))
    }

    /// All transitive descendants of a type, in declaration order
    pub fn descendants(&self, category: &str, name: &str) -> Vec<&ResolvedType> {
        self.types(category)
            .filter(|t| t.ancestry.iter().any(|a| a == name))
            .collect()
    }

    /// Number of resolved types across all categories
    pub fn len(&self) -> usize {
        self.categories.values().map(|t| t.types.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every effective type, keyed by category then type name.
    /// Keys come out sorted; entry lists keep their merge order.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut root = serde_json::Map::new();
        for category in self.categories() {
            let mut types = serde_json::Map::new();
            for resolved in self.types(category.as_str()) {
                types.insert(resolved.name.clone(), serde_json::to_value(resolved)?);
            }
            root.insert(category.to_string(), serde_json::Value::Object(types));
        }
        Ok(serde_json::Value::Object(root))
    }
}

impl DataTypeLookup for TypeCatalog {
    fn data_type_properties(&self, name: &str) -> Option<&[SchemaEntry]> {
        self.resolve(TypeCategory::data().as_str(), name)
            .map(|t| t.properties.as_slice())
    }

    fn is_unresolved_data_type(&self, name: &str) -> bool {
        let data = TypeCategory::data();
        self.declarations
            .get(&data)
            .is_some_and(|decls| decls.contains(name))
            && self.resolve(data.as_str(), name).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{
        S_DOC_DUPLICATE_TYPE, S_DOC_MALFORMED, S_REF_UNKNOWN_PARENT, S_TYPE_INVALID_DEFAULT,
        S_TYPE_INVALID_SCHEMA,
    };
    use pretty_assertions::assert_eq;

    fn doc(name: &str, types: Vec<(&str, TypeDefinition)>) -> ProfileDocument {
        types
            .into_iter()
            .fold(ProfileDocument::new(name), |doc, (category, def)| doc.with_type(category, def))
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = TypeCatalog::load(Vec::new()).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.resolve("node", "Root").is_none());
    }

    #[test]
    fn test_same_name_in_different_categories() {
        let catalog = TypeCatalog::load([doc(
            "a.yaml",
            vec![
                ("node", TypeDefinition::new("Root")),
                ("capability", TypeDefinition::new("Root")),
            ],
        )])
        .unwrap();
        assert_eq!(catalog.len(), 2);
        let categories: Vec<_> = catalog.categories().map(TypeCategory::as_str).collect();
        assert_eq!(categories, vec!["capability", "node"]);
    }

    #[test]
    fn test_derivation_does_not_cross_categories() {
        let err = TypeCatalog::load([doc(
            "a.yaml",
            vec![
                ("node", TypeDefinition::new("Root")),
                ("capability", TypeDefinition::new("Endpoint").derived_from("Root")),
            ],
        )])
        .unwrap_err();
        assert_eq!(err.codes(), vec![S_REF_UNKNOWN_PARENT]);
    }

    #[test]
    fn test_duplicate_in_same_document() {
        let err = TypeCatalog::load([doc(
            "a.yaml",
            vec![
                ("node", TypeDefinition::new("Root")),
                ("node", TypeDefinition::new("Root")),
            ],
        )])
        .unwrap_err();
        assert_eq!(err.codes(), vec![S_DOC_DUPLICATE_TYPE]);
    }

    #[test]
    fn test_duplicate_in_same_yaml_document() {
        let document = ProfileDocument::from_yaml(
            "dup.yaml",
            "node_types:\n  Root: {}\n  Root: {description: again}\n",
        )
        .unwrap();
        let err = TypeCatalog::load([document]).unwrap_err();
        assert_eq!(err.codes(), vec![S_DOC_DUPLICATE_TYPE]);
    }

    #[test]
    fn test_parse_problems_reported_with_resolution_errors() {
        let document = ProfileDocument::from_yaml(
            "mixed.yaml",
            r#"
node_types:
  A:
    properties:
      p: {default: 1}
  B:
    derived_from: Missing
  C:
    derived_from: A
"#,
        )
        .unwrap();
        let err = TypeCatalog::load([document]).unwrap_err();
        assert_eq!(err.codes(), vec![S_TYPE_INVALID_SCHEMA, S_REF_UNKNOWN_PARENT]);
        assert!(matches!(
            &err.errors[1],
            CatalogError::UnknownParent { type_name, .. } if type_name == "B"
        ));
    }

    #[test]
    fn test_unscoped_problems_come_first() {
        let document = ProfileDocument::from_yaml(
            "a.yaml",
            "node_types:\n  Web: {derived_from: Server}\npolicy_types: 42\n",
        )
        .unwrap();
        let err = TypeCatalog::load([document]).unwrap_err();
        assert_eq!(err.codes(), vec![S_DOC_MALFORMED, S_REF_UNKNOWN_PARENT]);
    }

    #[test]
    fn test_failed_data_type_is_reported_once() {
        let endpoint = TypeDefinition::new("Endpoint")
            .derived_from("Missing")
            .with_property(SchemaEntry::property("host", "string"));
        let default: profile_types::ProfileValue = serde_yaml::from_str("{host: localhost}").unwrap();
        let service = TypeDefinition::new("Service")
            .with_property(SchemaEntry::property("endpoint", "Endpoint").with_default(default.clone()))
            .with_property(SchemaEntry::property("backup", "Endpoint").with_default(default));

        let err = TypeCatalog::load([doc(
            "a.yaml",
            vec![("capability", service), ("data", endpoint)],
        )])
        .unwrap_err();
        assert_eq!(err.codes(), vec![S_REF_UNKNOWN_PARENT]);
        assert_eq!(err.errors[0].category(), Some(&TypeCategory::data()));
    }

    #[test]
    fn test_errors_ordered_by_category_then_position() {
        let err = TypeCatalog::load([doc(
            "a.yaml",
            vec![
                ("node", TypeDefinition::new("Late").derived_from("Nope")),
                (
                    "capability",
                    TypeDefinition::new("Broken").with_property(
                        SchemaEntry::property("enabled", "boolean").with_default("yes"),
                    ),
                ),
                ("capability", TypeDefinition::new("Orphan").derived_from("Nope")),
            ],
        )])
        .unwrap_err();
        assert_eq!(
            err.codes(),
            vec![S_TYPE_INVALID_DEFAULT, S_REF_UNKNOWN_PARENT, S_REF_UNKNOWN_PARENT]
        );
        assert_eq!(err.errors[0].category(), Some(&TypeCategory::capability()));
        assert_eq!(err.errors[2].category(), Some(&TypeCategory::node()));
    }

    #[test]
    fn test_complex_data_type_defaults() {
        let endpoint = TypeDefinition::new("Endpoint")
            .with_property(SchemaEntry::property("host", "string"))
            .with_property(SchemaEntry::property("port", "integer").with_default(80));
        let default: profile_types::ProfileValue = serde_yaml::from_str("{host: localhost}").unwrap();
        let service = TypeDefinition::new("Service")
            .with_property(SchemaEntry::property("endpoint", "Endpoint").with_default(default));

        let catalog = TypeCatalog::load([doc(
            "a.yaml",
            vec![("capability", service.clone()), ("data", endpoint)],
        )])
        .unwrap();
        assert!(catalog.data_type_properties("Endpoint").is_some());

        let err = TypeCatalog::load([doc("b.yaml", vec![("capability", service)])]).unwrap_err();
        assert_eq!(err.codes(), vec![S_TYPE_INVALID_DEFAULT]);
    }

    #[test]
    fn test_descendants_and_ancestry() {
        let catalog = TypeCatalog::load([doc(
            "a.yaml",
            vec![
                ("node", TypeDefinition::new("Root")),
                ("node", TypeDefinition::new("Compute").derived_from("Root")),
                ("node", TypeDefinition::new("Container").derived_from("Compute")),
                ("node", TypeDefinition::new("Storage").derived_from("Root")),
            ],
        )])
        .unwrap();

        let names: Vec<_> = catalog
            .descendants("node", "Compute")
            .into_iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["Container"]);
        assert_eq!(catalog.descendants("node", "Root").len(), 3);
        assert!(catalog.is_derived_from("node", "Container", "Root"));
        assert!(!catalog.is_derived_from("node", "Root", "Root"));
        assert!(!catalog.is_derived_from("node", "Storage", "Compute"));
        assert_eq!(
            catalog.resolve("node", "Container").unwrap().ancestry(),
            &["Compute".to_string(), "Root".to_string()]
        );
    }
}
