//! Schema value model
//!
//! Interprets the `type` of a schema entry and checks literal values
//! (defaults, constraint operands, candidate values) against it. Checking
//! never coerces: `"true"` is a string, not a boolean.

pub mod constraints;
pub mod scalar;

use profile_types::{EntrySchema, ProfileValue, SchemaEntry};
use thiserror::Error;

pub use constraints::{check_clause, ClauseExt};
pub use scalar::{parse_timestamp, Range, ScalarUnitKind, Version};

/// Why a value does not fit a schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValueError {
    pub message: String,
}

impl ValueError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn mismatch(expected: &str, value: &ProfileValue) -> Self {
        Self::new(format!("expected {}, found {}", expected, value_kind(value)))
    }

    /// Prefix the message with the location inside a nested value
    fn within(self, location: impl std::fmt::Display) -> Self {
        Self::new(format!("{}: {}", location, self.message))
    }
}

/// Access to the effective schema of complex data types
pub trait DataTypeLookup {
    /// Effective properties of a data type, or `None` if it is not declared
    fn data_type_properties(&self, name: &str) -> Option<&[SchemaEntry]>;

    /// Declared but failed to resolve; its error is already reported, so
    /// values of this type are not checked.
    fn is_unresolved_data_type(&self, _name: &str) -> bool {
        false
    }
}

/// Lookup with no complex data types at all
impl DataTypeLookup for () {
    fn data_type_properties(&self, _name: &str) -> Option<&[SchemaEntry]> {
        None
    }
}

/// Interpretation of a schema entry's `type`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Version,
    Range,
    List,
    Map,
    ScalarUnit(ScalarUnitKind),
    Any,
    /// A complex type declared in the `data` category
    Named(String),
}

impl DataType {
    pub fn parse(type_name: &str) -> Self {
        match type_name {
            "string" => Self::String,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "boolean" => Self::Boolean,
            "timestamp" => Self::Timestamp,
            "version" => Self::Version,
            "range" => Self::Range,
            "list" => Self::List,
            "map" => Self::Map,
            "any" => Self::Any,
            other => match ScalarUnitKind::from_type_name(other) {
                Some(kind) => Self::ScalarUnit(kind),
                None => Self::Named(other.to_string()),
            },
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::List | Self::Map)
    }

    /// Types whose values support `greater_than` and friends
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            Self::String
                | Self::Integer
                | Self::Float
                | Self::Timestamp
                | Self::Version
                | Self::ScalarUnit(_)
        )
    }

    /// Types whose values have a length
    pub fn has_length(&self) -> bool {
        matches!(self, Self::String | Self::List | Self::Map)
    }
}

/// Short description of a literal's YAML kind for messages
pub fn value_kind(value: &ProfileValue) -> &'static str {
    match value {
        ProfileValue::Null => "null",
        ProfileValue::Bool(_) => "boolean",
        ProfileValue::Number(n) if n.is_f64() => "float",
        ProfileValue::Number(_) => "integer",
        ProfileValue::String(_) => "string",
        ProfileValue::Sequence(_) => "list",
        ProfileValue::Mapping(_) => "map",
        ProfileValue::Tagged(_) => "tagged value",
    }
}

/// Check `value` against `type_name`, descending into collections and complex
/// data types. Element constraints from `entry_schema` and field constraints
/// of complex data types are evaluated on the way down.
pub fn check_value(
    lookup: &dyn DataTypeLookup,
    type_name: &str,
    entry_schema: Option<&EntrySchema>,
    value: &ProfileValue,
) -> Result<(), ValueError> {
    let data_type = DataType::parse(type_name);
    match &data_type {
        DataType::Any => Ok(()),
        DataType::String => match value {
            ProfileValue::String(_) => Ok(()),
            other => Err(ValueError::mismatch("string", other)),
        },
        DataType::Boolean => match value {
            ProfileValue::Bool(_) => Ok(()),
            other => Err(ValueError::mismatch("boolean", other)),
        },
        DataType::Integer => match value {
            ProfileValue::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
            other => Err(ValueError::mismatch("integer", other)),
        },
        // An integer literal is a valid float; the reverse is not true.
        DataType::Float => match value {
            ProfileValue::Number(_) => Ok(()),
            other => Err(ValueError::mismatch("float", other)),
        },
        DataType::Timestamp => {
            let text = expect_string("timestamp", value)?;
            parse_timestamp(text)
                .map(|_| ())
                .ok_or_else(|| ValueError::new(format!("'{text}' is not a valid timestamp")))
        }
        DataType::Version => {
            let text = expect_string("version", value)?;
            Version::parse(text)
                .map(|_| ())
                .ok_or_else(|| ValueError::new(format!("'{text}' is not a valid version")))
        }
        DataType::Range => Range::parse(value).map(|_| ()).map_err(ValueError::new),
        DataType::ScalarUnit(kind) => {
            let text = expect_string(kind.type_name(), value)?;
            kind.parse(text).map(|_| ()).map_err(ValueError::new)
        }
        DataType::List => {
            let ProfileValue::Sequence(items) = value else {
                return Err(ValueError::mismatch("list", value));
            };
            let entry_schema = require_entry_schema(type_name, entry_schema)?;
            for (index, item) in items.iter().enumerate() {
                check_element(lookup, entry_schema, item)
                    .map_err(|e| e.within(format_args!("element {index}")))?;
            }
            Ok(())
        }
        DataType::Map => {
            let ProfileValue::Mapping(mapping) = value else {
                return Err(ValueError::mismatch("map", value));
            };
            let entry_schema = require_entry_schema(type_name, entry_schema)?;
            for (key, item) in mapping {
                let ProfileValue::String(key) = key else {
                    return Err(ValueError::new(format!(
                        "map keys must be strings, found {}",
                        value_kind(key)
                    )));
                };
                check_element(lookup, entry_schema, item)
                    .map_err(|e| e.within(format_args!("key '{key}'")))?;
            }
            Ok(())
        }
        DataType::Named(name) => check_complex(lookup, name, value),
    }
}

/// `check_value` plus the entry's own constraints
pub fn validate_entry_value(
    lookup: &dyn DataTypeLookup,
    entry: &SchemaEntry,
    value: &ProfileValue,
) -> Result<(), ValueError> {
    check_value(lookup, &entry.type_name, entry.entry_schema.as_ref(), value)?;
    for clause in &entry.constraints {
        if !clause.satisfied_by(&entry.type_name, value)? {
            return Err(ValueError::new(format!(
                "value violates constraint '{}'",
                clause.operator
            )));
        }
    }
    Ok(())
}

fn expect_string<'v>(expected: &str, value: &'v ProfileValue) -> Result<&'v str, ValueError> {
    match value {
        ProfileValue::String(text) => Ok(text),
        other => Err(ValueError::mismatch(expected, other)),
    }
}

fn require_entry_schema<'e>(
    type_name: &str,
    entry_schema: Option<&'e EntrySchema>,
) -> Result<&'e EntrySchema, ValueError> {
    entry_schema.ok_or_else(|| ValueError::new(format!("{type_name} requires an entry_schema")))
}

fn check_element(
    lookup: &dyn DataTypeLookup,
    entry_schema: &EntrySchema,
    item: &ProfileValue,
) -> Result<(), ValueError> {
    // Nested collections are not expressible with a name-only entry schema.
    check_value(lookup, &entry_schema.type_name, None, item)?;
    for clause in &entry_schema.constraints {
        if !clause.satisfied_by(&entry_schema.type_name, item)? {
            return Err(ValueError::new(format!(
                "value violates constraint '{}'",
                clause.operator
            )));
        }
    }
    Ok(())
}

fn check_complex(
    lookup: &dyn DataTypeLookup,
    name: &str,
    value: &ProfileValue,
) -> Result<(), ValueError> {
    let Some(properties) = lookup.data_type_properties(name) else {
        if lookup.is_unresolved_data_type(name) {
            return Ok(());
        }
        return Err(ValueError::new(format!("unknown data type '{name}'")));
    };
    let ProfileValue::Mapping(mapping) = value else {
        return Err(ValueError::mismatch(name, value));
    };

    for (key, field_value) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| ValueError::new(format!("{name} field names must be strings")))?;
        let field = properties
            .iter()
            .find(|p| p.name == key)
            .ok_or_else(|| ValueError::new(format!("{name} has no property '{key}'")))?;
        validate_entry_value(lookup, field, field_value)
            .map_err(|e| e.within(format_args!("{name}.{key}")))?;
    }

    for field in properties {
        if field.required && field.default.is_none() && mapping.get(field.name.as_str()).is_none() {
            return Err(ValueError::new(format!(
                "{name} is missing required property '{}'",
                field.name
            )));
        }
    }
    Ok(())
}
