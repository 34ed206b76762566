//! Join graph assembly.
//!
//! Collects the relation hops demanded by explicit join directives, filter
//! predicates, order keys, and projections into one deduplicated, ordered
//! join list. Two rules keep output deterministic: hops are keyed by their
//! dotted-path alias, and first appearance wins the position. Explicit
//! directives set the join kind for their terminal hop; every implied hop
//! defaults to an inner join.

use crate::query::compile::JoinRequirement;
use crate::query::paths::RelationHop;
use query_manager_core::{Error, Result};
use std::collections::HashMap;

/// The SQL join kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`.
    Inner,
    /// `LEFT OUTER JOIN`.
    Left,
    /// `FULL OUTER JOIN`.
    Full,
}

impl JoinKind {
    /// The SQL keyword sequence for this kind.
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT OUTER JOIN",
            Self::Full => "FULL OUTER JOIN",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Full => "full",
        }
    }
}

/// An explicit join request staged on a query: a relation path plus the kind
/// to use for its terminal hop.
#[derive(Debug, Clone)]
pub struct JoinDirective {
    /// The dotted relation path (`group`, `group__owner`).
    pub path: String,
    /// The join kind for the path's final hop.
    pub kind: JoinKind,
}

/// One join in the final plan, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    /// Join kind.
    pub kind: JoinKind,
    /// The joined table.
    pub table: &'static str,
    /// The deterministic alias (the dotted path).
    pub alias: String,
    /// The qualifier holding the parent-side join column.
    pub parent_qualifier: String,
    /// Join column on the parent side.
    pub local_column: &'static str,
    /// Join column on the joined side.
    pub target_column: &'static str,
}

/// Assembles join steps from resolved directive chains and implied
/// requirements.
///
/// Directives come first so their kinds take effect before any implied hop
/// is added; within a directive chain, prefix hops that were not explicitly
/// declared default to inner joins. Two directives declaring different kinds
/// for the same path conflict. An explicit declaration upgrades a hop that
/// was previously added as an implied prefix.
pub fn assemble(
    directives: &[(JoinRequirement, JoinKind)],
    requirements: &[JoinRequirement],
) -> Result<Vec<JoinStep>> {
    let mut steps: Vec<JoinStep> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut declared: HashMap<String, JoinKind> = HashMap::new();

    for (chain, kind) in directives {
        for (pos, hop) in chain.iter().enumerate() {
            let terminal = pos + 1 == chain.len();
            if terminal {
                if let Some(&existing) = declared.get(&hop.alias) {
                    if existing != *kind {
                        return Err(Error::ConflictingJoinKind {
                            path: hop.alias.clone(),
                            first: existing.label(),
                            second: kind.label(),
                        });
                    }
                } else {
                    declared.insert(hop.alias.clone(), *kind);
                    if let Some(&idx) = index.get(&hop.alias) {
                        steps[idx].kind = *kind;
                    }
                }
            }
            push_hop(&mut steps, &mut index, &declared, hop);
        }
    }

    for chain in requirements {
        for hop in chain {
            push_hop(&mut steps, &mut index, &declared, hop);
        }
    }

    Ok(steps)
}

fn push_hop(
    steps: &mut Vec<JoinStep>,
    index: &mut HashMap<String, usize>,
    declared: &HashMap<String, JoinKind>,
    hop: &RelationHop,
) {
    if index.contains_key(&hop.alias) {
        return;
    }
    let kind = declared.get(&hop.alias).copied().unwrap_or(JoinKind::Inner);
    index.insert(hop.alias.clone(), steps.len());
    steps.push(JoinStep {
        kind,
        table: hop.table,
        alias: hop.alias.clone(),
        parent_qualifier: hop.parent_qualifier.clone(),
        local_column: hop.local_column,
        target_column: hop.target_column,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FieldDef, ModelDef, ModelGraph, RelationDef};
    use crate::query::paths::PathResolver;

    fn graph() -> ModelGraph {
        ModelGraph::new()
            .register(
                ModelDef::new("item", "items")
                    .field(FieldDef::new("id").primary_key())
                    .field(FieldDef::new("name"))
                    .relation(RelationDef::many_to_one("group", "group", "group_id", "id")),
            )
            .register(
                ModelDef::new("group", "groups")
                    .field(FieldDef::new("id").primary_key())
                    .field(FieldDef::new("name"))
                    .relation(RelationDef::many_to_one("owner", "owner", "owner_id", "id")),
            )
            .register(
                ModelDef::new("owner", "owners")
                    .field(FieldDef::new("id").primary_key())
                    .field(FieldDef::new("first_name")),
            )
    }

    fn chain(resolver: &PathResolver<'_>, path: &str) -> JoinRequirement {
        resolver.resolve_relations(path).unwrap()
    }

    #[test]
    fn test_shared_prefix_joined_once() {
        let graph = graph();
        let resolver = PathResolver::new(&graph, "item").unwrap();
        let reqs = vec![
            chain(&resolver, "group__owner"),
            chain(&resolver, "group"),
        ];
        let steps = assemble(&[], &reqs).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].alias, "group");
        assert_eq!(steps[1].alias, "group__owner");
    }

    #[test]
    fn test_directive_and_requirement_same_path_single_join() {
        let graph = graph();
        let resolver = PathResolver::new(&graph, "item").unwrap();
        let directives = vec![(chain(&resolver, "group"), JoinKind::Inner)];
        let reqs = vec![chain(&resolver, "group")];
        let steps = assemble(&directives, &reqs).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, JoinKind::Inner);
    }

    #[test]
    fn test_directive_kind_applies_to_terminal_only() {
        let graph = graph();
        let resolver = PathResolver::new(&graph, "item").unwrap();
        let directives = vec![(chain(&resolver, "group__owner"), JoinKind::Left)];
        let steps = assemble(&directives, &[]).unwrap();
        assert_eq!(steps[0].alias, "group");
        assert_eq!(steps[0].kind, JoinKind::Inner);
        assert_eq!(steps[1].alias, "group__owner");
        assert_eq!(steps[1].kind, JoinKind::Left);
    }

    #[test]
    fn test_conflicting_kinds_rejected() {
        let graph = graph();
        let resolver = PathResolver::new(&graph, "item").unwrap();
        let directives = vec![
            (chain(&resolver, "group"), JoinKind::Inner),
            (chain(&resolver, "group"), JoinKind::Left),
        ];
        let err = assemble(&directives, &[]).unwrap_err();
        assert!(matches!(err, Error::ConflictingJoinKind { .. }));
    }

    #[test]
    fn test_same_kind_twice_is_fine() {
        let graph = graph();
        let resolver = PathResolver::new(&graph, "item").unwrap();
        let directives = vec![
            (chain(&resolver, "group"), JoinKind::Left),
            (chain(&resolver, "group"), JoinKind::Left),
        ];
        let steps = assemble(&directives, &[]).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, JoinKind::Left);
    }

    #[test]
    fn test_explicit_declaration_upgrades_implied_prefix() {
        let graph = graph();
        let resolver = PathResolver::new(&graph, "item").unwrap();
        // "group" first appears as an implied prefix of "group__owner",
        // then gets declared left explicitly.
        let directives = vec![
            (chain(&resolver, "group__owner"), JoinKind::Inner),
            (chain(&resolver, "group"), JoinKind::Left),
        ];
        let steps = assemble(&directives, &[]).unwrap();
        assert_eq!(steps[0].alias, "group");
        assert_eq!(steps[0].kind, JoinKind::Left);
    }

    #[test]
    fn test_emission_order_is_first_appearance() {
        let graph = graph();
        let resolver = PathResolver::new(&graph, "item").unwrap();
        let reqs = vec![chain(&resolver, "group"), chain(&resolver, "group__owner")];
        let a = assemble(&[], &reqs).unwrap();
        let b = assemble(&[], &reqs).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].alias, "group");
    }
}
