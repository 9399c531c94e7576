//! Reading context handed to entity readers
//!
//! A `ReadContext` wraps one document node. Readers pull fields out of it by
//! descriptor; whatever is left when they finish is reported as unknown.
//! Suppressed fields (set through [`ReadContext::set_read_tag`]) are treated
//! as absent from the grammar: if the document supplies one, a
//! [`DocumentFieldError`] is recorded and the value is not returned.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use profile_types::ProfileValue;
use tracing::debug;

use crate::error::{D_FIELD_INVALID, D_FIELD_MISSING, D_FIELD_UNKNOWN, D_FIELD_UNSUPPORTED};
use crate::schema::value_kind;

// ============================================================================
// Field descriptors
// ============================================================================

/// A field an entity reader knows about.
///
/// `name` is the grammar-level field name used for suppression
/// (`TriggerDefinitions`); `key` is the document key (`triggers`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub key: &'static str,
}

impl Field {
    pub const fn new(name: &'static str, key: &'static str) -> Self {
        Self { name, key }
    }
}

// ============================================================================
// Document field errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    /// Known to the grammar but suppressed for the document's version
    Unsupported,
    Unknown,
    Missing,
    Invalid(String),
}

/// One problem with one field of one document node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFieldError {
    /// Location of the node holding the field
    pub path: String,
    pub entity_kind: String,
    /// Document key
    pub field: String,
    pub version: String,
    pub problem: FieldProblem,
}

impl DocumentFieldError {
    pub fn code(&self) -> &'static str {
        match self.problem {
            FieldProblem::Unsupported => D_FIELD_UNSUPPORTED,
            FieldProblem::Unknown => D_FIELD_UNKNOWN,
            FieldProblem::Missing => D_FIELD_MISSING,
            FieldProblem::Invalid(_) => D_FIELD_INVALID,
        }
    }

    pub fn message(&self) -> String {
        match &self.problem {
            FieldProblem::Unsupported => format!(
                "field '{}' of {} is not supported in grammar version '{}'",
                self.field, self.entity_kind, self.version
            ),
            FieldProblem::Unknown => {
                format!("unknown field '{}' in {}", self.field, self.entity_kind)
            }
            FieldProblem::Missing => {
                format!("{} is missing required field '{}'", self.entity_kind, self.field)
            }
            FieldProblem::Invalid(reason) => {
                format!("invalid field '{}' in {}: {}", self.field, self.entity_kind, reason)
            }
        }
    }
}

impl std::fmt::Display for DocumentFieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message())
    }
}

impl std::error::Error for DocumentFieldError {}

/// Shared sink for document field errors.
///
/// Cloning yields another handle to the same sink, so reads of separate
/// subtrees (on separate threads if need be) can report into one place.
#[derive(Debug, Clone, Default)]
pub struct Problems(Arc<Mutex<Vec<DocumentFieldError>>>);

impl Problems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, error: DocumentFieldError) {
        debug!(path = %error.path, code = error.code(), "{}", error.message());
        self.lock().push(error);
    }

    /// Copy of everything recorded so far, in recording order
    pub fn snapshot(&self) -> Vec<DocumentFieldError> {
        self.lock().clone()
    }

    /// Drain everything recorded so far
    pub fn take(&self) -> Vec<DocumentFieldError> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DocumentFieldError>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// ReadContext
// ============================================================================

/// Per-node reading state
#[derive(Debug)]
pub struct ReadContext {
    name: String,
    path: String,
    node: ProfileValue,
    version: String,
    /// Entity kind currently being read; set by the registry
    kind: String,
    /// `(scope, field name)` pairs suppressed for the current read call
    suppressed: Vec<(String, String)>,
    consumed: HashSet<String>,
    problems: Problems,
}

impl ReadContext {
    pub fn new(
        name: impl Into<String>,
        node: ProfileValue,
        version: impl Into<String>,
        problems: Problems,
    ) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            node,
            version: version.into(),
            kind: String::new(),
            suppressed: Vec::new(),
            consumed: HashSet::new(),
            problems,
        }
    }

    /// Context for a nested node. Suppression does not carry over.
    pub fn child(&self, name: impl Into<String>, node: ProfileValue) -> Self {
        let name = name.into();
        Self {
            path: format!("{}.{}", self.path, name),
            name,
            node,
            version: self.version.clone(),
            kind: String::new(),
            suppressed: Vec::new(),
            consumed: HashSet::new(),
            problems: self.problems.clone(),
        }
    }

    /// Key under which the node appears in its parent
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn node(&self) -> &ProfileValue {
        &self.node
    }

    /// Grammar version the document is written in
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn problems(&self) -> &Problems {
        &self.problems
    }

    pub(crate) fn enter_kind(&mut self, kind: &str) -> String {
        std::mem::replace(&mut self.kind, kind.to_string())
    }

    pub(crate) fn leave_kind(&mut self, previous: String) {
        self.kind = previous;
    }

    // ── Suppression ──────────────────────────────────────────────────

    /// Mark `field` of `scope` as not recognised until the suppression is
    /// rolled back past this point
    pub fn set_read_tag(&mut self, scope: &str, field: &str) {
        self.suppressed.push((scope.to_string(), field.to_string()));
    }

    pub fn is_suppressed(&self, scope: &str, field: &str) -> bool {
        self.suppressed
            .iter()
            .any(|(s, f)| s == scope && f == field)
    }

    /// Current depth of the suppression stack
    pub fn suppression_mark(&self) -> usize {
        self.suppressed.len()
    }

    /// Drop every suppression set after `mark`
    pub fn restore_suppression(&mut self, mark: usize) {
        self.suppressed.truncate(mark);
    }

    // ── Field access ─────────────────────────────────────────────────

    /// Whether the node is a mapping; records a problem if it is not
    pub fn expect_mapping(&self) -> bool {
        if self.node.is_mapping() {
            return true;
        }
        self.report(
            "",
            FieldProblem::Invalid(format!("expected a mapping, found {}", value_kind(&self.node))),
        );
        false
    }

    /// Take a field's raw value.
    ///
    /// Returns `None` if the field is absent or suppressed for the current
    /// entity kind.
    pub fn take(&mut self, field: &Field) -> Option<ProfileValue> {
        let value = self.node.as_mapping()?.get(field.key)?.clone();
        self.consumed.insert(field.key.to_string());
        if self.is_suppressed(&self.kind, field.name) {
            self.report(field.key, FieldProblem::Unsupported);
            return None;
        }
        Some(value)
    }

    /// Like [`take`](Self::take), recording a problem if the field is absent.
    /// A suppressed field does not exist in this version and is never missing.
    pub fn take_required(&mut self, field: &Field) -> Option<ProfileValue> {
        if self.is_suppressed(&self.kind, field.name) {
            return self.take(field);
        }
        let present = self
            .node
            .as_mapping()
            .is_some_and(|m| m.contains_key(field.key));
        if !present {
            self.report(field.key, FieldProblem::Missing);
            return None;
        }
        self.take(field)
    }

    pub fn take_string(&mut self, field: &Field) -> Option<String> {
        let value = self.take(field)?;
        self.string_value(field, value)
    }

    pub fn take_required_string(&mut self, field: &Field) -> Option<String> {
        let value = self.take_required(field)?;
        self.string_value(field, value)
    }

    /// Mapping of strings to scalars (numbers and booleans are stringified)
    pub fn take_string_map(&mut self, field: &Field) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let Some(value) = self.take(field) else {
            return map;
        };
        let ProfileValue::Mapping(mapping) = value else {
            self.invalid(field, "expected a mapping");
            return map;
        };
        for (key, value) in mapping {
            let text = match &value {
                ProfileValue::String(s) => Some(s.clone()),
                ProfileValue::Bool(b) => Some(b.to_string()),
                ProfileValue::Number(n) => Some(n.to_string()),
                _ => None,
            };
            match (key.as_str(), text) {
                (Some(key), Some(text)) => {
                    map.insert(key.to_string(), text);
                }
                _ => self.invalid(field, "expected string keys and scalar values"),
            }
        }
        map
    }

    /// Mapping of names to arbitrary values, in document order
    pub fn take_value_map(&mut self, field: &Field) -> Vec<(String, ProfileValue)> {
        let Some(value) = self.take(field) else {
            return Vec::new();
        };
        let ProfileValue::Mapping(mapping) = value else {
            self.invalid(field, "expected a mapping");
            return Vec::new();
        };
        let mut entries = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            match key.as_str() {
                Some(key) => entries.push((key.to_string(), value)),
                None => self.invalid(field, "expected string keys"),
            }
        }
        entries
    }

    /// List of strings; a single string is accepted as a one-element list
    pub fn take_string_list(&mut self, field: &Field) -> Vec<String> {
        let Some(value) = self.take(field) else {
            return Vec::new();
        };
        match value {
            ProfileValue::String(s) => vec![s],
            ProfileValue::Sequence(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ProfileValue::String(s) => list.push(s),
                        other => self.invalid(
                            field,
                            &format!("expected string elements, found {}", value_kind(&other)),
                        ),
                    }
                }
                list
            }
            other => {
                self.invalid(field, &format!("expected a list, found {}", value_kind(&other)));
                Vec::new()
            }
        }
    }

    /// Record every key of the node that no reader consumed
    pub fn report_unknown_fields(&self) {
        let Some(mapping) = self.node.as_mapping() else {
            return;
        };
        for key in mapping.keys() {
            match key.as_str() {
                Some(key) if self.consumed.contains(key) => {}
                Some(key) => self.report(key, FieldProblem::Unknown),
                None => self.report("", FieldProblem::Invalid("non-string key".to_string())),
            }
        }
    }

    fn string_value(&self, field: &Field, value: ProfileValue) -> Option<String> {
        match value {
            ProfileValue::String(s) => Some(s),
            other => {
                self.invalid(field, &format!("expected a string, found {}", value_kind(&other)));
                None
            }
        }
    }

    fn invalid(&self, field: &Field, reason: &str) {
        self.report(field.key, FieldProblem::Invalid(reason.to_string()));
    }

    pub(crate) fn report(&self, field: &str, problem: FieldProblem) {
        self.problems.record(DocumentFieldError {
            path: self.path.clone(),
            entity_kind: self.kind.clone(),
            field: field.to_string(),
            version: self.version.clone(),
            problem,
        });
    }
}
