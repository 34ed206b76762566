//! The operator vocabulary: key suffixes and their validated lookup forms.
//!
//! A filter key may end in `__<operator>`; a bare key means equality. The
//! suffix table is closed: an unrecognized suffix on an otherwise-valid field
//! path is a typed error, not a silently-applied equality filter. Operand
//! shapes are validated at build time so the SQL renderer only ever sees
//! well-formed lookups.

use crate::query::paths::PATH_SEPARATOR;
use crate::value::Value;
use query_manager_core::{Error, Result};

/// Every operator suffix the key parser recognizes.
pub const OPERATOR_SUFFIXES: &[&str] = &[
    "eq", "not", "in", "not_in", "gt", "gte", "lt", "lte", "is", "is_not", "isnull", "like",
    "ilike",
];

/// Returns `true` if the segment is a recognized operator suffix.
pub fn is_operator(segment: &str) -> bool {
    OPERATOR_SUFFIXES.contains(&segment)
}

/// Splits a filter key into its path part and optional operator suffix.
///
/// Only the final segment is considered, and only when at least one path
/// segment precedes it. A single-segment key is always a path, so a field
/// that happens to be named like an operator (`is`, `in`) still filters by
/// equality when used bare.
pub fn split_key(key: &str) -> (&str, Option<&str>) {
    if let Some(idx) = key.rfind(PATH_SEPARATOR) {
        let candidate = &key[idx + PATH_SEPARATOR.len()..];
        if is_operator(candidate) {
            return (&key[..idx], Some(candidate));
        }
    }
    (key, None)
}

/// A validated comparison: one operator with its type-checked operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Equality. A null operand compiles to an `IS NULL` test.
    Exact(Value),
    /// Negated equality. A null operand compiles to `IS NOT NULL`.
    NotExact(Value),
    /// Set membership. An empty list matches nothing.
    In(Vec<Value>),
    /// Negated set membership. An empty list matches every non-null value.
    NotIn(Vec<Value>),
    /// Strictly greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Strictly less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Identity test (`IS`), for booleans and null.
    Is(Value),
    /// Negated identity test (`IS NOT`).
    IsNot(Value),
    /// Null test; `true` checks for null, `false` for not-null.
    IsNull(bool),
    /// Case-sensitive pattern match.
    Like(String),
    /// Case-insensitive pattern match.
    ILike(String),
}

impl Lookup {
    /// Builds a lookup from an operator suffix and its operand, validating
    /// the operand shape. A missing suffix means equality.
    pub fn build(operator: Option<&str>, value: Value) -> Result<Self> {
        let op = operator.unwrap_or("eq");
        match op {
            "eq" => Ok(Self::Exact(require_scalar(op, value)?)),
            "not" => Ok(Self::NotExact(require_scalar(op, value)?)),
            "in" => Ok(Self::In(require_list(op, value)?)),
            "not_in" => Ok(Self::NotIn(require_list(op, value)?)),
            "gt" => Ok(Self::Gt(require_comparable(op, value)?)),
            "gte" => Ok(Self::Gte(require_comparable(op, value)?)),
            "lt" => Ok(Self::Lt(require_comparable(op, value)?)),
            "lte" => Ok(Self::Lte(require_comparable(op, value)?)),
            "is" => Ok(Self::Is(require_identity(op, value)?)),
            "is_not" => Ok(Self::IsNot(require_identity(op, value)?)),
            "isnull" => match value {
                Value::Bool(b) => Ok(Self::IsNull(b)),
                other => Err(shape_error(op, "a boolean", &other)),
            },
            "like" => match value {
                Value::String(s) => Ok(Self::Like(s)),
                other => Err(shape_error(op, "a string pattern", &other)),
            },
            "ilike" => match value {
                Value::String(s) => Ok(Self::ILike(s)),
                other => Err(shape_error(op, "a string pattern", &other)),
            },
            other => Err(Error::UnknownOperator {
                operator: other.to_string(),
            }),
        }
    }

    /// The operator suffix this lookup was built from.
    pub const fn operator(&self) -> &'static str {
        match self {
            Self::Exact(_) => "eq",
            Self::NotExact(_) => "not",
            Self::In(_) => "in",
            Self::NotIn(_) => "not_in",
            Self::Gt(_) => "gt",
            Self::Gte(_) => "gte",
            Self::Lt(_) => "lt",
            Self::Lte(_) => "lte",
            Self::Is(_) => "is",
            Self::IsNot(_) => "is_not",
            Self::IsNull(_) => "isnull",
            Self::Like(_) => "like",
            Self::ILike(_) => "ilike",
        }
    }
}

fn shape_error(operator: &str, expected: &'static str, actual: &Value) -> Error {
    Error::InvalidValueShape {
        operator: operator.to_string(),
        expected,
        actual: format!("{actual:?}"),
    }
}

fn require_scalar(operator: &str, value: Value) -> Result<Value> {
    if value.is_scalar() {
        Ok(value)
    } else {
        Err(shape_error(operator, "a scalar value", &value))
    }
}

fn require_comparable(operator: &str, value: Value) -> Result<Value> {
    if value.is_scalar() && !value.is_null() {
        Ok(value)
    } else {
        Err(shape_error(operator, "a non-null scalar value", &value))
    }
}

fn require_list(operator: &str, value: Value) -> Result<Vec<Value>> {
    match value {
        Value::List(items) => {
            if let Some(bad) = items.iter().find(|v| !v.is_scalar()) {
                return Err(shape_error(operator, "a list of scalar values", bad));
            }
            Ok(items)
        }
        other => Err(shape_error(operator, "a list of scalar values", &other)),
    }
}

fn require_identity(operator: &str, value: Value) -> Result<Value> {
    match value {
        Value::Bool(_) | Value::Null => Ok(value),
        other => Err(shape_error(operator, "a boolean or null", &other)),
    }
}
