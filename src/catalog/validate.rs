//! Per-type validation of declared schema entries
//!
//! Only a type's own entries are checked; inherited entries were checked
//! on the type that declared them. The first failing entry ends validation
//! of its type.
//!
//! Order per entry:
//!   1. structure (`entry_schema` present iff the type is a collection)
//!   2. default type-checks
//!   3. constraint clauses are well-formed
//!   4. default satisfies the constraints

use profile_types::{FieldKind, SchemaEntry, TypeCategory, TypeDefinition};

use crate::error::CatalogError;
use crate::schema::{check_clause, check_value, ClauseExt, DataType, DataTypeLookup};

/// Validate the own entries of one type
pub(crate) fn validate_type(
    lookup: &dyn DataTypeLookup,
    category: &TypeCategory,
    definition: &TypeDefinition,
) -> Result<(), CatalogError> {
    for kind in [FieldKind::Property, FieldKind::Attribute] {
        for entry in definition.entries(kind) {
            validate_entry(lookup, entry)
                .map_err(|failure| failure.into_error(category, &definition.name, kind, &entry.name))?;
        }
    }
    Ok(())
}

enum EntryFailure {
    Schema(String),
    Default(String),
    Constraint(String),
}

impl EntryFailure {
    fn into_error(
        self,
        category: &TypeCategory,
        type_name: &str,
        kind: FieldKind,
        field: &str,
    ) -> CatalogError {
        let category = category.clone();
        let type_name = type_name.to_string();
        let field = field.to_string();
        match self {
            Self::Schema(reason) => CatalogError::InvalidSchema {
                category,
                type_name,
                kind,
                field,
                reason,
            },
            Self::Default(reason) => CatalogError::InvalidDefault {
                category,
                type_name,
                kind,
                field,
                reason,
            },
            Self::Constraint(reason) => CatalogError::InvalidConstraint {
                category,
                type_name,
                kind,
                field,
                reason,
            },
        }
    }
}

fn validate_entry(lookup: &dyn DataTypeLookup, entry: &SchemaEntry) -> Result<(), EntryFailure> {
    let data_type = DataType::parse(&entry.type_name);
    let entry_schema = entry.entry_schema.as_ref();

    match (data_type.is_collection(), entry_schema) {
        (true, None) => {
            return Err(EntryFailure::Schema(format!(
                "{} requires an entry_schema",
                entry.type_name
            )))
        }
        (false, Some(_)) => {
            return Err(EntryFailure::Schema(format!(
                "entry_schema is only allowed on list and map, not {}",
                entry.type_name
            )))
        }
        (true, Some(schema)) if DataType::parse(&schema.type_name).is_collection() => {
            return Err(EntryFailure::Schema(format!(
                "nested collection entry_schema '{}' is not supported",
                schema.type_name
            )))
        }
        _ => {}
    }

    if let Some(default) = &entry.default {
        check_value(lookup, &entry.type_name, entry_schema, default)
            .map_err(|e| EntryFailure::Default(e.message))?;
    }

    if let Some(schema) = entry_schema {
        for clause in &schema.constraints {
            check_clause(lookup, &schema.type_name, None, clause)
                .map_err(|e| EntryFailure::Constraint(format!("entry_schema: {}", e.message)))?;
        }
    }
    for clause in &entry.constraints {
        check_clause(lookup, &entry.type_name, entry_schema, clause)
            .map_err(|e| EntryFailure::Constraint(e.message))?;
    }

    if let Some(default) = &entry.default {
        for clause in &entry.constraints {
            let satisfied = clause
                .satisfied_by(&entry.type_name, default)
                .map_err(|e| EntryFailure::Constraint(e.message))?;
            if !satisfied {
                return Err(EntryFailure::Default(format!(
                    "default violates constraint '{}'",
                    clause.operator
                )));
            }
        }
    }

    Ok(())
}
