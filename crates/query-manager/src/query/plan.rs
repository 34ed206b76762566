//! Staged query state and plan construction.
//!
//! [`StagedQuery`] is the inert accumulation of filters, ordering,
//! projection, pagination, and join directives; nothing is validated until a
//! terminal operation asks [`PlanBuilder`] for a [`QueryPlan`]. The builder
//! resolves every key against the model graph, assembles the join list, and
//! expands the projection into concrete output columns. Building a plan
//! touches no session.

use crate::graph::{ModelDef, ModelGraph};
use crate::query::compile::{
    compile_filter, compile_order, JoinRequirement, Predicate, SortExpression, SortKey,
};
use crate::query::joins::{assemble, JoinDirective, JoinKind, JoinStep};
use crate::query::paths::{PathResolver, ProjectionTarget, PATH_SEPARATOR};
use crate::value::Value;
use query_manager_core::Result;

/// The accumulated, unvalidated state of a staged query.
#[derive(Debug, Clone, Default)]
pub struct StagedQuery {
    /// Filter entries in insertion order. Re-filtering the same key replaces
    /// the value while keeping the original position.
    pub filters: Vec<(String, Value)>,
    /// Sort keys in insertion order, deduplicated.
    pub orders: Vec<SortKey>,
    /// Projection paths; empty means whole root entities.
    pub fields: Vec<String>,
    /// Explicit join directives in insertion order.
    pub joins: Vec<JoinDirective>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
    /// Number of rows to skip.
    pub offset: Option<usize>,
}

impl StagedQuery {
    /// Stages a filter entry. A repeated key overwrites the previous value
    /// in place.
    pub fn merge_filter(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.filters.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.filters.push((key, value));
        }
    }

    /// Stages a sort key; an exact duplicate is dropped.
    pub fn push_order(&mut self, key: SortKey) {
        if !self.orders.contains(&key) {
            self.orders.push(key);
        }
    }

    /// Stages projection paths, appending to any previous selection.
    pub fn push_fields<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(paths.into_iter().map(Into::into));
    }

    /// Stages an explicit join directive.
    pub fn push_join(&mut self, path: impl Into<String>, kind: JoinKind) {
        self.joins.push(JoinDirective {
            path: path.into(),
            kind,
        });
    }
}

/// One output column of a plan: a qualified source column and its output
/// name in the result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    /// The table qualifier (root table or join alias).
    pub qualifier: String,
    /// The source column name.
    pub column: String,
    /// The name this column carries in result rows.
    pub output: String,
}

/// A fully validated, executable description of one query.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// The root model name.
    pub root_model: &'static str,
    /// The root table.
    pub root_table: &'static str,
    /// Output columns in deterministic order.
    pub columns: Vec<SelectColumn>,
    /// Whether results materialize as root entities (no explicit projection).
    pub entity_shaped: bool,
    /// Joins in emission order.
    pub joins: Vec<JoinStep>,
    /// AND-combined predicates in staging order.
    pub predicates: Vec<Predicate>,
    /// Ordering terms in staging order.
    pub ordering: Vec<SortExpression>,
    /// Row limit.
    pub limit: Option<usize>,
    /// Row offset.
    pub offset: Option<usize>,
}

/// Builds [`QueryPlan`]s for one root model.
pub struct PlanBuilder<'g> {
    graph: &'g ModelGraph,
    root: &'g ModelDef,
}

impl<'g> PlanBuilder<'g> {
    /// Creates a builder rooted at the named model.
    pub fn new(graph: &'g ModelGraph, root_model: &str) -> Result<Self> {
        let root = graph.model(root_model)?;
        Ok(Self { graph, root })
    }

    /// The root model definition.
    pub const fn root(&self) -> &'g ModelDef {
        self.root
    }

    /// Validates the staged state and produces a plan.
    ///
    /// Join requirements are gathered in a fixed order: explicit directives,
    /// then filter paths, then order paths, then projection paths. That
    /// order, plus first-appearance dedup, makes the join list a pure
    /// function of the staged state.
    pub fn build(&self, staged: &StagedQuery) -> Result<QueryPlan> {
        let resolver = PathResolver::new(self.graph, self.root.name)?;

        let mut directives = Vec::with_capacity(staged.joins.len());
        for directive in &staged.joins {
            let hops = resolver.resolve_relations(&directive.path)?;
            directives.push((hops, directive.kind));
        }

        let mut requirements: Vec<JoinRequirement> = Vec::new();
        let mut predicates = Vec::with_capacity(staged.filters.len());
        for (key, value) in &staged.filters {
            let (predicate, hops) = compile_filter(&resolver, key, value)?;
            requirements.push(hops);
            predicates.push(predicate);
        }

        let mut ordering = Vec::with_capacity(staged.orders.len());
        for sort in &staged.orders {
            let (expr, hops) = compile_order(&resolver, sort)?;
            requirements.push(hops);
            ordering.push(expr);
        }

        let (columns, entity_shaped) = if staged.fields.is_empty() {
            (self.root_columns(), true)
        } else {
            let mut columns = Vec::new();
            for path in &staged.fields {
                let (hops, target) = resolver.resolve_projection(path)?;
                requirements.push(hops);
                match target {
                    ProjectionTarget::Field(field) => columns.push(SelectColumn {
                        output: if field.qualifier == self.root.table {
                            field.column.clone()
                        } else {
                            field.path.clone()
                        },
                        qualifier: field.qualifier,
                        column: field.column,
                    }),
                    ProjectionTarget::Model {
                        qualifier,
                        model,
                        path,
                    } => {
                        let target_model = self.graph.model(model)?;
                        for column in target_model.column_names() {
                            columns.push(SelectColumn {
                                qualifier: qualifier.clone(),
                                column: column.to_string(),
                                output: format!("{path}{PATH_SEPARATOR}{column}"),
                            });
                        }
                    }
                }
            }
            (columns, false)
        };

        let joins = assemble(&directives, &requirements)?;

        Ok(QueryPlan {
            root_model: self.root.name,
            root_table: self.root.table,
            columns,
            entity_shaped,
            joins,
            predicates,
            ordering,
            limit: staged.limit,
            offset: staged.offset,
        })
    }

    /// Plan for a first-match terminal: the staged plan capped at one row.
    pub fn build_first(&self, staged: &StagedQuery) -> Result<QueryPlan> {
        let mut plan = self.build(staged)?;
        plan.limit = Some(1);
        Ok(plan)
    }

    /// Plan for a last-match terminal: staged ordering is replaced by a
    /// descending sort on the root primary key, capped at one row.
    pub fn build_last(&self, staged: &StagedQuery) -> Result<QueryPlan> {
        let mut override_staged = staged.clone();
        override_staged.orders = vec![SortKey::desc(self.root.primary_key())];
        let mut plan = self.build(&override_staged)?;
        plan.limit = Some(1);
        Ok(plan)
    }

    /// Plan for a one-shot lookup from bare filter entries, ignoring any
    /// staged state.
    pub fn build_get(&self, filters: &[(String, Value)]) -> Result<QueryPlan> {
        let mut staged = StagedQuery::default();
        for (key, value) in filters {
            staged.merge_filter(key.clone(), value.clone());
        }
        staged.limit = Some(1);
        self.build(&staged)
    }

    /// Plan selecting only the root primary key for the staged filters and
    /// joins. Used to pin down the row set targeted by a bulk update.
    pub fn build_pk_select(&self, staged: &StagedQuery) -> Result<QueryPlan> {
        let mut pk_staged = staged.clone();
        pk_staged.fields = vec![self.root.primary_key().to_string()];
        pk_staged.orders.clear();
        pk_staged.limit = None;
        pk_staged.offset = None;
        self.build(&pk_staged)
    }

    fn root_columns(&self) -> Vec<SelectColumn> {
        self.root
            .column_names()
            .iter()
            .map(|column| SelectColumn {
                qualifier: self.root.table.to_string(),
                column: (*column).to_string(),
                output: (*column).to_string(),
            })
            .collect()
    }
}
