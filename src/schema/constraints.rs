//! Constraint clauses: well-formedness per entry type, and evaluation
//! against candidate values.

use std::cmp::Ordering;

use profile_types::{ConstraintClause, ConstraintOperator, EntrySchema, ProfileValue};
use regex::Regex;

use super::{
    check_value, parse_timestamp, value_kind, DataType, DataTypeLookup, ValueError, Version,
};

/// Evaluation of a clause against a candidate value
pub trait ClauseExt {
    /// Whether `value` (already known to fit `type_name`) satisfies the clause.
    ///
    /// Errors when the clause operand itself is malformed for `type_name`.
    fn satisfied_by(&self, type_name: &str, value: &ProfileValue) -> Result<bool, ValueError>;
}

impl ClauseExt for ConstraintClause {
    fn satisfied_by(&self, type_name: &str, value: &ProfileValue) -> Result<bool, ValueError> {
        let data_type = DataType::parse(type_name);
        let operand = &self.operand;
        match self.operator {
            ConstraintOperator::Equal => values_equal(&data_type, value, operand),
            ConstraintOperator::GreaterThan => {
                Ok(compare(&data_type, value, operand)? == Ordering::Greater)
            }
            ConstraintOperator::GreaterOrEqual => {
                Ok(compare(&data_type, value, operand)? != Ordering::Less)
            }
            ConstraintOperator::LessThan => {
                Ok(compare(&data_type, value, operand)? == Ordering::Less)
            }
            ConstraintOperator::LessOrEqual => {
                Ok(compare(&data_type, value, operand)? != Ordering::Greater)
            }
            ConstraintOperator::InRange => {
                let (lower, upper) = bounds(operand)?;
                Ok(compare(&data_type, value, lower)? != Ordering::Less
                    && compare(&data_type, value, upper)? != Ordering::Greater)
            }
            ConstraintOperator::ValidValues => {
                for member in members(operand)? {
                    if values_equal(&data_type, value, member)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ConstraintOperator::Length => Ok(length_of(value)? == expected_length(operand)?),
            ConstraintOperator::MinLength => Ok(length_of(value)? >= expected_length(operand)?),
            ConstraintOperator::MaxLength => Ok(length_of(value)? <= expected_length(operand)?),
            ConstraintOperator::Pattern => {
                let ProfileValue::String(text) = value else {
                    return Err(ValueError::new(format!(
                        "pattern applies to strings, found {}",
                        value_kind(value)
                    )));
                };
                Ok(compile_pattern(operand)?.is_match(text))
            }
        }
    }
}

/// Check that a clause is well-formed for an entry of type `type_name`
pub fn check_clause(
    lookup: &dyn DataTypeLookup,
    type_name: &str,
    entry_schema: Option<&EntrySchema>,
    clause: &ConstraintClause,
) -> Result<(), ValueError> {
    let data_type = DataType::parse(type_name);
    let operator = clause.operator;
    let operand = &clause.operand;

    let check_operand = |value: &ProfileValue| {
        check_value(lookup, type_name, entry_schema, value)
            .map_err(|e| ValueError::new(format!("operand of '{operator}': {e}")))
    };
    let require_ordered = || {
        if data_type.is_ordered() {
            Ok(())
        } else {
            Err(ValueError::new(format!(
                "'{operator}' requires an ordered type, not '{type_name}'"
            )))
        }
    };
    let require_length = || {
        if data_type.has_length() {
            Ok(())
        } else {
            Err(ValueError::new(format!(
                "'{operator}' requires a string, list or map type, not '{type_name}'"
            )))
        }
    };

    match operator {
        ConstraintOperator::Equal => check_operand(operand),
        ConstraintOperator::GreaterThan
        | ConstraintOperator::GreaterOrEqual
        | ConstraintOperator::LessThan
        | ConstraintOperator::LessOrEqual => {
            require_ordered()?;
            check_operand(operand)
        }
        ConstraintOperator::InRange => {
            require_ordered()?;
            let (lower, upper) = bounds(operand)?;
            check_operand(lower)?;
            check_operand(upper)?;
            if compare(&data_type, lower, upper)? == Ordering::Greater {
                return Err(ValueError::new("in_range lower bound exceeds upper bound"));
            }
            Ok(())
        }
        ConstraintOperator::ValidValues => {
            let members = members(operand)?;
            if members.is_empty() {
                return Err(ValueError::new("valid_values must not be empty"));
            }
            members.iter().try_for_each(|member| check_operand(member))
        }
        ConstraintOperator::Length
        | ConstraintOperator::MinLength
        | ConstraintOperator::MaxLength => {
            require_length()?;
            expected_length(operand).map(|_| ())
        }
        ConstraintOperator::Pattern => {
            if data_type != DataType::String {
                return Err(ValueError::new(format!(
                    "'pattern' requires a string type, not '{type_name}'"
                )));
            }
            compile_pattern(operand).map(|_| ())
        }
    }
}

fn bounds(operand: &ProfileValue) -> Result<(&ProfileValue, &ProfileValue), ValueError> {
    match operand {
        ProfileValue::Sequence(items) if items.len() == 2 => Ok((&items[0], &items[1])),
        _ => Err(ValueError::new("in_range expects a list of two bounds")),
    }
}

fn members(operand: &ProfileValue) -> Result<&[ProfileValue], ValueError> {
    match operand {
        ProfileValue::Sequence(items) => Ok(items),
        other => Err(ValueError::new(format!(
            "valid_values expects a list, found {}",
            value_kind(other)
        ))),
    }
}

fn expected_length(operand: &ProfileValue) -> Result<usize, ValueError> {
    operand
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| ValueError::new("length bound must be a non-negative integer"))
}

fn length_of(value: &ProfileValue) -> Result<usize, ValueError> {
    match value {
        ProfileValue::String(text) => Ok(text.chars().count()),
        ProfileValue::Sequence(items) => Ok(items.len()),
        ProfileValue::Mapping(mapping) => Ok(mapping.len()),
        other => Err(ValueError::new(format!("{} has no length", value_kind(other)))),
    }
}

/// Patterns must match the whole value
fn compile_pattern(operand: &ProfileValue) -> Result<Regex, ValueError> {
    let ProfileValue::String(pattern) = operand else {
        return Err(ValueError::new("pattern must be a string"));
    };
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| ValueError::new(format!("invalid pattern '{pattern}': {e}")))
}

fn values_equal(
    data_type: &DataType,
    a: &ProfileValue,
    b: &ProfileValue,
) -> Result<bool, ValueError> {
    if data_type.is_ordered() {
        Ok(compare(data_type, a, b)? == Ordering::Equal)
    } else {
        Ok(a == b)
    }
}

fn compare(
    data_type: &DataType,
    a: &ProfileValue,
    b: &ProfileValue,
) -> Result<Ordering, ValueError> {
    let incomparable =
        || ValueError::new(format!("cannot compare {} with {}", value_kind(a), value_kind(b)));

    match data_type {
        DataType::Integer | DataType::Float => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                return Ok(x.cmp(&y));
            }
            let (x, y) = (
                a.as_f64().ok_or_else(incomparable)?,
                b.as_f64().ok_or_else(incomparable)?,
            );
            x.partial_cmp(&y).ok_or_else(incomparable)
        }
        DataType::String => match (a, b) {
            (ProfileValue::String(x), ProfileValue::String(y)) => Ok(x.cmp(y)),
            _ => Err(incomparable()),
        },
        DataType::Timestamp => {
            let parse = |v: &ProfileValue| v.as_str().and_then(parse_timestamp);
            let (x, y) = (parse(a).ok_or_else(incomparable)?, parse(b).ok_or_else(incomparable)?);
            Ok(x.cmp(&y))
        }
        DataType::Version => {
            let parse = |v: &ProfileValue| v.as_str().and_then(Version::parse);
            let (x, y) = (parse(a).ok_or_else(incomparable)?, parse(b).ok_or_else(incomparable)?);
            Ok(x.cmp(&y))
        }
        DataType::ScalarUnit(kind) => {
            let parse = |v: &ProfileValue| v.as_str().and_then(|s| kind.parse(s).ok());
            let (x, y) = (parse(a).ok_or_else(incomparable)?, parse(b).ok_or_else(incomparable)?);
            x.partial_cmp(&y).ok_or_else(incomparable)
        }
        _ => Err(incomparable()),
    }
}
