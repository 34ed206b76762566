//! Filter and order compilation.
//!
//! Turns raw `key => value` pairs and sort keys into validated [`Predicate`]s
//! and [`SortExpression`]s, each paired with the relation hops the referenced
//! path demands. Compilation fails closed: every error surfaces before any
//! SQL is rendered.

use crate::query::lookups::{split_key, Lookup};
use crate::query::paths::{FieldRef, PathResolver, RelationHop, PATH_SEPARATOR};
use crate::value::Value;
use query_manager_core::{Error, Result};

/// The relation hops one compiled expression requires.
pub type JoinRequirement = Vec<RelationHop>;

/// One compiled filter condition. All predicates on a query are AND-combined.
#[derive(Debug, Clone)]
pub struct Predicate {
    /// The column the condition applies to.
    pub target: FieldRef,
    /// The validated comparison.
    pub lookup: Lookup,
}

/// Where null values sort relative to non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPlacement {
    /// Nulls before all non-null values.
    First,
    /// Nulls after all non-null values.
    Last,
}

/// A raw sort key as staged by the caller.
///
/// `SortKey::parse("-name")` is descending `name`; without the leading `-`
/// the direction is ascending. Null placement is optional and left to the
/// backend default when unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// The dotted field path.
    pub key: String,
    /// Sort direction.
    pub descending: bool,
    /// Optional explicit null placement.
    pub nulls: Option<NullPlacement>,
}

impl SortKey {
    /// Parses the string form: an optional leading `-` for descending.
    pub fn parse(raw: &str) -> Self {
        raw.strip_prefix('-').map_or_else(
            || Self {
                key: raw.to_string(),
                descending: false,
                nulls: None,
            },
            |rest| Self {
                key: rest.to_string(),
                descending: true,
                nulls: None,
            },
        )
    }

    /// An ascending sort key.
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            descending: false,
            nulls: None,
        }
    }

    /// A descending sort key.
    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            descending: true,
            nulls: None,
        }
    }

    /// Places nulls before all non-null values.
    #[must_use]
    pub const fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullPlacement::First);
        self
    }

    /// Places nulls after all non-null values.
    #[must_use]
    pub const fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullPlacement::Last);
        self
    }
}

/// One compiled ordering term.
#[derive(Debug, Clone)]
pub struct SortExpression {
    /// The column to sort by.
    pub target: FieldRef,
    /// Sort direction.
    pub descending: bool,
    /// Optional explicit null placement.
    pub nulls: Option<NullPlacement>,
}

/// Compiles one `key => value` filter entry.
///
/// The key is split into path and operator suffix first; the path is then
/// resolved against the model graph. When the whole key fails to resolve but
/// its prefix is a valid field, the trailing segment was an operator typo and
/// the error says so instead of reporting an unresolved path.
pub fn compile_filter(
    resolver: &PathResolver<'_>,
    key: &str,
    value: &Value,
) -> Result<(Predicate, JoinRequirement)> {
    let (path, operator) = split_key(key);
    match resolver.resolve_field(path) {
        Ok((hops, target)) => {
            let lookup = Lookup::build(operator, value.clone())?;
            Ok((Predicate { target, lookup }, hops))
        }
        Err(err) => {
            if operator.is_none() {
                if let Some(idx) = path.rfind(PATH_SEPARATOR) {
                    let (prefix, tail) = (&path[..idx], &path[idx + PATH_SEPARATOR.len()..]);
                    if resolver.resolve_field(prefix).is_ok() {
                        return Err(Error::UnknownOperator {
                            operator: tail.to_string(),
                        });
                    }
                }
            }
            Err(err)
        }
    }
}

/// Compiles one sort key. Order keys carry no operator suffixes.
pub fn compile_order(
    resolver: &PathResolver<'_>,
    sort: &SortKey,
) -> Result<(SortExpression, JoinRequirement)> {
    let (hops, target) = resolver.resolve_field(&sort.key)?;
    Ok((
        SortExpression {
            target,
            descending: sort.descending,
            nulls: sort.nulls,
        },
        hops,
    ))
}
