//! Profile documents
//!
//! A profile document declares types under top-level `<category>_types`
//! sections. Parsing turns the raw YAML into `(category, TypeDefinition)` pairs
//! in declaration order and records every shape problem it finds rather than
//! stopping at the first. Well-formed types are kept next to the problems so
//! the catalog can report both in one batch.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::marker::PhantomData;

use profile_types::{
    ConstraintClause, ConstraintOperator, EntrySchema, FieldKind, ProfileValue, SchemaEntry,
    TypeCategory, TypeDefinition,
};
use serde::de::value::SeqAccessDeserializer;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use tracing::{debug, warn};

use crate::error::{CatalogError, CatalogLoadError};

/// Document-level key naming the grammar version the document is written in
pub const DEFINITIONS_VERSION_KEY: &str = "tosca_definitions_version";

/// A problem found while parsing a document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentProblem {
    /// `(category, type name)` of the declaration the problem sits in
    pub scope: Option<(TypeCategory, String)>,
    pub error: CatalogError,
}

/// One already-parsed profile document
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDocument {
    pub name: String,
    pub definitions_version: Option<String>,
    /// Declared types in document order
    pub types: Vec<(TypeCategory, TypeDefinition)>,
    /// Shape problems in document order; reported when the document is loaded
    pub problems: Vec<DocumentProblem>,
}

impl ProfileDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definitions_version: None,
            types: Vec::new(),
            problems: Vec::new(),
        }
    }

    pub fn with_type(mut self, category: impl Into<TypeCategory>, definition: TypeDefinition) -> Self {
        self.types.push((category.into(), definition));
        self
    }

    /// Parse a document from YAML text.
    ///
    /// Fails only when the text is not YAML at all. Shape problems are kept
    /// in [`problems`](Self::problems).
    pub fn from_yaml(name: impl Into<String>, text: &str) -> Result<Self, CatalogLoadError> {
        let name = name.into();
        let root: Node<Node<ProfileValue>> = serde_yaml::from_str(text).map_err(|e| {
            CatalogLoadError::new(vec![CatalogError::MalformedDocument {
                document: name.clone(),
                path: "<root>".to_string(),
                reason: e.to_string(),
            }])
        })?;
        Ok(DocumentParser::new(name).parse(root))
    }

    /// Parse a document from an already-read YAML value
    pub fn from_value(name: impl Into<String>, value: &ProfileValue) -> Self {
        let root = Node::lift(value.clone(), |section| Node::lift(section, |body| body));
        DocumentParser::new(name.into()).parse(root)
    }

    /// The document's own problems as a batch
    pub fn check(&self) -> Result<(), CatalogLoadError> {
        if self.problems.is_empty() {
            return Ok(());
        }
        Err(CatalogLoadError::new(
            self.problems.iter().map(|p| p.error.clone()).collect(),
        ))
    }

    /// Types of one category, in document order
    pub fn types_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a TypeDefinition> + 'a {
        self.types
            .iter()
            .filter(move |(c, _)| c.as_str() == category)
            .map(|(_, def)| def)
    }
}

// ── Raw YAML ─────────────────────────────────────────────────────

/// A YAML node whose mapping entries are kept in order, repeated keys included.
/// `serde_yaml::Mapping` rejects repeated keys.
enum Node<V> {
    Mapping(Vec<(ProfileValue, V)>),
    Other(ProfileValue),
}

impl<V> Node<V> {
    fn lift(value: ProfileValue, wrap: impl Fn(ProfileValue) -> V) -> Self {
        match value {
            ProfileValue::Mapping(mapping) => {
                Node::Mapping(mapping.into_iter().map(|(k, v)| (k, wrap(v))).collect())
            }
            other => Node::Other(other),
        }
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Node<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor(PhantomData))
    }
}

struct NodeVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for NodeVisitor<V> {
    type Value = Node<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a YAML value")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry::<ProfileValue, V>()? {
            entries.push(entry);
        }
        Ok(Node::Mapping(entries))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
        ProfileValue::deserialize(SeqAccessDeserializer::new(seq)).map(Node::Other)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        Node::deserialize(deserializer)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Node::Other(ProfileValue::Null))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Node::Other(ProfileValue::Null))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Node::Other(ProfileValue::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Node::Other(ProfileValue::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Node::Other(ProfileValue::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Node::Other(ProfileValue::from(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Node::Other(ProfileValue::String(v.to_string())))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Node::Other(ProfileValue::String(v)))
    }
}

// ── Parser ───────────────────────────────────────────────────────

struct DocumentParser {
    document: String,
    /// Declaration currently being parsed
    scope: Option<(TypeCategory, String)>,
    problems: Vec<DocumentProblem>,
}

/// Position of a schema entry, for error reporting
struct EntryScope<'a> {
    category: &'a TypeCategory,
    type_name: &'a str,
    kind: FieldKind,
    field: &'a str,
}

impl EntryScope<'_> {
    fn invalid_schema(&self, reason: impl Into<String>) -> CatalogError {
        CatalogError::InvalidSchema {
            category: self.category.clone(),
            type_name: self.type_name.to_string(),
            kind: self.kind,
            field: self.field.to_string(),
            reason: reason.into(),
        }
    }

    fn invalid_constraint(&self, reason: impl Into<String>) -> CatalogError {
        CatalogError::InvalidConstraint {
            category: self.category.clone(),
            type_name: self.type_name.to_string(),
            kind: self.kind,
            field: self.field.to_string(),
            reason: reason.into(),
        }
    }
}

impl DocumentParser {
    fn new(document: String) -> Self {
        Self {
            document,
            scope: None,
            problems: Vec::new(),
        }
    }

    fn push(&mut self, error: CatalogError) {
        self.problems.push(DocumentProblem {
            scope: self.scope.clone(),
            error,
        });
    }

    fn malformed(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.push(CatalogError::MalformedDocument {
            document: self.document.clone(),
            path: path.into(),
            reason: reason.into(),
        });
    }

    fn parse(mut self, root: Node<Node<ProfileValue>>) -> ProfileDocument {
        let mut document = ProfileDocument::new(self.document.clone());

        let sections = match root {
            Node::Mapping(sections) => sections,
            Node::Other(ProfileValue::Null) => Vec::new(),
            Node::Other(_) => {
                self.malformed("<root>", "document must be a mapping");
                Vec::new()
            }
        };

        let mut declared: HashSet<(TypeCategory, String)> = HashSet::new();
        for (key, section) in sections {
            let Some(key) = key.as_str() else {
                self.malformed("<root>", "top-level keys must be strings");
                continue;
            };

            if key == DEFINITIONS_VERSION_KEY {
                match section {
                    Node::Other(ProfileValue::String(version)) => {
                        document.definitions_version = Some(version)
                    }
                    _ => self.malformed(key, "expected a string"),
                }
                continue;
            }

            let Some(category) = TypeCategory::from_section_key(key) else {
                debug!(document = %self.document, key, "Ignoring non-type section");
                continue;
            };

            let types = match section {
                Node::Mapping(types) => types,
                Node::Other(ProfileValue::Null) => continue,
                Node::Other(_) => {
                    self.malformed(key, "expected a mapping of type names to type bodies");
                    continue;
                }
            };

            for (type_name, body) in types {
                let Some(type_name) = type_name.as_str() else {
                    self.malformed(key, "type names must be strings");
                    continue;
                };
                let scope = (category.clone(), type_name.to_string());
                if !declared.insert(scope.clone()) {
                    self.scope = Some(scope);
                    self.push(CatalogError::DuplicateCategoryTypeInSameDocument {
                        document: self.document.clone(),
                        category: category.clone(),
                        type_name: type_name.to_string(),
                    });
                    self.scope = None;
                    continue;
                }

                self.scope = Some(scope);
                let path = format!("{key}.{type_name}");
                let definition = self.parse_type(&category, type_name, &body, &path);
                document.types.push((category.clone(), definition));
                self.scope = None;
            }
        }

        document.problems = self.problems;
        document
    }

    /// A body that is not a mapping still declares the type, so its
    /// descendants are not reported again as having an unknown parent.
    fn parse_type(
        &mut self,
        category: &TypeCategory,
        type_name: &str,
        body: &ProfileValue,
        path: &str,
    ) -> TypeDefinition {
        let mut definition = TypeDefinition::new(type_name);

        let body = match body {
            ProfileValue::Null => return definition,
            ProfileValue::Mapping(body) => body,
            _ => {
                self.malformed(path, "type body must be a mapping");
                return definition;
            }
        };

        for (key, value) in body {
            let Some(key) = key.as_str() else {
                self.malformed(path, "type body keys must be strings");
                continue;
            };
            let field_path = format!("{path}.{key}");
            match key {
                "description" => match value.as_str() {
                    Some(text) => definition.description = text.to_string(),
                    None => self.malformed(field_path, "expected a string"),
                },
                "derived_from" => match value.as_str() {
                    Some(parent) => definition.derived_from = Some(parent.to_string()),
                    None => self.malformed(field_path, "expected a type name"),
                },
                "properties" => {
                    definition.properties =
                        self.parse_entries(category, type_name, FieldKind::Property, value, &field_path);
                }
                "attributes" => {
                    definition.attributes =
                        self.parse_entries(category, type_name, FieldKind::Attribute, value, &field_path);
                }
                "metadata" => {
                    if let Some(metadata) = self.parse_metadata(value, &field_path) {
                        definition.metadata = metadata;
                    }
                }
                other => {
                    debug!(document = %self.document, path, key = other, "Ignoring key outside the catalog schema");
                }
            }
        }

        definition
    }

    fn parse_metadata(&mut self, value: &ProfileValue, path: &str) -> Option<BTreeMap<String, String>> {
        let mapping = match value {
            ProfileValue::Null => return Some(BTreeMap::new()),
            ProfileValue::Mapping(mapping) => mapping,
            _ => {
                self.malformed(path, "metadata must be a mapping");
                return None;
            }
        };

        let mut metadata = BTreeMap::new();
        for (key, value) in mapping {
            let (Some(key), Some(value)) = (key.as_str(), scalar_text(value)) else {
                self.malformed(path, "metadata must map strings to scalar values");
                continue;
            };
            metadata.insert(key.to_string(), value);
        }
        Some(metadata)
    }

    fn parse_entries(
        &mut self,
        category: &TypeCategory,
        type_name: &str,
        kind: FieldKind,
        value: &ProfileValue,
        path: &str,
    ) -> Vec<SchemaEntry> {
        let mapping = match value {
            ProfileValue::Null => return Vec::new(),
            ProfileValue::Mapping(mapping) => mapping,
            _ => {
                self.malformed(path, format!("{} must be a mapping", kind.section_key()));
                return Vec::new();
            }
        };

        let mut entries = Vec::with_capacity(mapping.len());
        for (field, body) in mapping {
            let Some(field) = field.as_str() else {
                self.malformed(path, "field names must be strings");
                continue;
            };
            let scope = EntryScope {
                category,
                type_name,
                kind,
                field,
            };
            match parse_entry(&scope, body) {
                Ok(entry) => entries.push(entry),
                Err(error) => self.push(error),
            }
        }
        entries
    }
}

fn parse_entry(scope: &EntryScope<'_>, body: &ProfileValue) -> Result<SchemaEntry, CatalogError> {
    let ProfileValue::Mapping(body) = body else {
        return Err(scope.invalid_schema("entry body must be a mapping"));
    };

    let type_name = body
        .get("type")
        .and_then(ProfileValue::as_str)
        .ok_or_else(|| scope.invalid_schema("missing 'type'"))?;

    let mut entry = match scope.kind {
        FieldKind::Property => SchemaEntry::property(scope.field, type_name),
        FieldKind::Attribute => SchemaEntry::attribute(scope.field, type_name),
    };

    for (key, value) in body {
        match key.as_str() {
            Some("type") => {}
            Some("description") => {
                let text = value
                    .as_str()
                    .ok_or_else(|| scope.invalid_schema("'description' must be a string"))?;
                entry.description = Some(text.to_string());
            }
            Some("required") => {
                let required = value
                    .as_bool()
                    .ok_or_else(|| scope.invalid_schema("'required' must be a boolean"))?;
                match scope.kind {
                    FieldKind::Property => entry.required = required,
                    FieldKind::Attribute if required => {
                        warn!(
                            category = %scope.category,
                            type_name = scope.type_name,
                            attribute = scope.field,
                            "Attributes are computed and never required; ignoring 'required: true'"
                        );
                    }
                    FieldKind::Attribute => {}
                }
            }
            Some("default") => entry.default = Some(value.clone()),
            Some("entry_schema") => entry.entry_schema = Some(parse_entry_schema(scope, value)?),
            Some("constraints") => entry.constraints = parse_constraints(scope, value)?,
            Some(other) => {
                debug!(field = scope.field, key = other, "Ignoring schema entry key");
            }
            None => return Err(scope.invalid_schema("entry keys must be strings")),
        }
    }

    Ok(entry)
}

/// `entry_schema: integer` or `entry_schema: {type: integer, constraints: [...]}`
fn parse_entry_schema(scope: &EntryScope<'_>, value: &ProfileValue) -> Result<EntrySchema, CatalogError> {
    match value {
        ProfileValue::String(type_name) => Ok(EntrySchema::new(type_name.as_str())),
        ProfileValue::Mapping(body) => {
            let type_name = body
                .get("type")
                .and_then(ProfileValue::as_str)
                .ok_or_else(|| scope.invalid_schema("entry_schema is missing 'type'"))?;
            let mut schema = EntrySchema::new(type_name);
            if let Some(constraints) = body.get("constraints") {
                schema.constraints = parse_constraints(scope, constraints)?;
            }
            Ok(schema)
        }
        _ => Err(scope.invalid_schema("entry_schema must be a type name or a mapping")),
    }
}

/// Ordered sequence of single-key mappings
fn parse_constraints(
    scope: &EntryScope<'_>,
    value: &ProfileValue,
) -> Result<Vec<ConstraintClause>, CatalogError> {
    let ProfileValue::Sequence(items) = value else {
        return Err(scope.invalid_constraint("constraints must be a list"));
    };

    items
        .iter()
        .map(|item| {
            let clause = match item {
                ProfileValue::Mapping(clause) if clause.len() == 1 => clause,
                _ => {
                    return Err(scope.invalid_constraint(
                        "each constraint must be a mapping with exactly one operator",
                    ))
                }
            };
            let (operator, operand) = clause
                .iter()
                .next()
                .ok_or_else(|| scope.invalid_constraint("empty constraint"))?;
            let keyword = operator.as_str().unwrap_or_default();
            let operator = ConstraintOperator::from_keyword(keyword)
                .ok_or_else(|| scope.invalid_constraint(format!("unknown operator '{keyword}'")))?;
            Ok(ConstraintClause::new(operator, operand.clone()))
        })
        .collect()
}

fn scalar_text(value: &ProfileValue) -> Option<String> {
    match value {
        ProfileValue::String(text) => Some(text.clone()),
        ProfileValue::Bool(b) => Some(b.to_string()),
        ProfileValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
