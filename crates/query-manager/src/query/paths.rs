//! Dotted-path resolution against the model graph.
//!
//! A key like `group__owner__first_name` is a chain of relation names ending
//! in a field. The resolver walks the chain left to right, producing the
//! relation hops (with deterministic join aliases) and a reference to the
//! terminal field. Resolution is total: the first segment that does not
//! resolve fails with a typed error, never a silent skip.

use crate::graph::{ModelDef, ModelGraph};
use query_manager_core::{Error, Result};

/// The segment separator in filter, order, and projection keys.
pub const PATH_SEPARATOR: &str = "__";

/// A fully qualified reference to one column in the compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// The table qualifier: the root table name, or a join alias.
    pub qualifier: String,
    /// The column name on that table.
    pub column: String,
    /// The original dotted key, used to alias cross-model output columns.
    pub path: String,
}

/// One relation traversal demanded by a resolved path.
///
/// The alias is the dotted path prefix up to and including this hop
/// (`group`, `group__owner`, ...), which makes aliases deterministic and
/// lets chains sharing a prefix share joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationHop {
    /// Join alias for the target table.
    pub alias: String,
    /// Qualifier of the side holding `local_column`: the root table or the
    /// previous hop's alias.
    pub parent_qualifier: String,
    /// The target model's name.
    pub target_model: &'static str,
    /// The target model's table.
    pub table: &'static str,
    /// Join column on the parent side.
    pub local_column: &'static str,
    /// Join column on the target side.
    pub target_column: &'static str,
}

/// The target of a projection entry: a single column, or every column of a
/// (possibly joined) model.
#[derive(Debug, Clone)]
pub enum ProjectionTarget {
    /// A single field.
    Field(FieldRef),
    /// The whole-model selector: all columns of the named model.
    Model {
        /// The table qualifier (root table or join alias).
        qualifier: String,
        /// The model whose columns are selected.
        model: &'static str,
        /// The dotted path that selected it (empty for the root).
        path: String,
    },
}

/// Resolves dotted keys against one root model.
pub struct PathResolver<'g> {
    graph: &'g ModelGraph,
    root: &'g ModelDef,
}

impl<'g> PathResolver<'g> {
    /// Creates a resolver rooted at the named model.
    pub fn new(graph: &'g ModelGraph, root_model: &str) -> Result<Self> {
        let root = graph.model(root_model)?;
        Ok(Self { graph, root })
    }

    /// The root model definition.
    pub const fn root(&self) -> &'g ModelDef {
        self.root
    }

    /// Resolves a path whose terminal segment must be a field.
    ///
    /// A single-segment path is looked up directly as a field and never
    /// attempts relation traversal.
    pub fn resolve_field(&self, key: &str) -> Result<(Vec<RelationHop>, FieldRef)> {
        let (hops, model, qualifier, terminal) = self.walk(key)?;
        let field = model.field_def(terminal).ok_or_else(|| Error::UnresolvedPath {
            model: model.name.to_string(),
            segment: terminal.to_string(),
        })?;
        Ok((
            hops,
            FieldRef {
                qualifier,
                column: field.name.to_string(),
                path: key.to_string(),
            },
        ))
    }

    /// Resolves a projection path: the terminal segment may be a field or a
    /// relation (the whole-model selector).
    pub fn resolve_projection(&self, key: &str) -> Result<(Vec<RelationHop>, ProjectionTarget)> {
        let (mut hops, model, qualifier, terminal) = self.walk(key)?;
        if let Some(field) = model.field_def(terminal) {
            return Ok((
                hops,
                ProjectionTarget::Field(FieldRef {
                    qualifier,
                    column: field.name.to_string(),
                    path: key.to_string(),
                }),
            ));
        }
        if let Some(rel) = model.relation_def(terminal) {
            let target = self.graph.model(rel.target)?;
            let alias = key.to_string();
            hops.push(RelationHop {
                alias: alias.clone(),
                parent_qualifier: qualifier,
                target_model: target.name,
                table: target.table,
                local_column: rel.local_column,
                target_column: rel.target_column,
            });
            return Ok((
                hops,
                ProjectionTarget::Model {
                    qualifier: alias,
                    model: target.name,
                    path: key.to_string(),
                },
            ));
        }
        Err(Error::UnresolvedPath {
            model: model.name.to_string(),
            segment: terminal.to_string(),
        })
    }

    /// Resolves a path consisting entirely of relation names, as used by
    /// explicit join directives.
    pub fn resolve_relations(&self, key: &str) -> Result<Vec<RelationHop>> {
        let mut hops = Vec::new();
        let mut model = self.root;
        let mut qualifier = self.root.table.to_string();
        let mut prefix = String::new();
        for segment in key.split(PATH_SEPARATOR) {
            let rel = model.relation_def(segment).ok_or_else(|| Error::UnresolvedPath {
                model: model.name.to_string(),
                segment: segment.to_string(),
            })?;
            let target = self.graph.model(rel.target)?;
            let alias = if prefix.is_empty() {
                segment.to_string()
            } else {
                format!("{prefix}{PATH_SEPARATOR}{segment}")
            };
            hops.push(RelationHop {
                alias: alias.clone(),
                parent_qualifier: qualifier,
                target_model: target.name,
                table: target.table,
                local_column: rel.local_column,
                target_column: rel.target_column,
            });
            qualifier = alias.clone();
            prefix = alias;
            model = target;
        }
        Ok(hops)
    }

    /// Walks all non-terminal segments as relations and returns the hops,
    /// the model the terminal segment applies to, its qualifier, and the
    /// terminal segment itself.
    fn walk<'k>(&self, key: &'k str) -> Result<(Vec<RelationHop>, &'g ModelDef, String, &'k str)> {
        let segments: Vec<&str> = key.split(PATH_SEPARATOR).collect();
        let mut hops = Vec::new();
        let mut model = self.root;
        let mut qualifier = self.root.table.to_string();
        let mut prefix = String::new();

        for segment in &segments[..segments.len() - 1] {
            let rel = model.relation_def(segment).ok_or_else(|| Error::UnresolvedPath {
                model: model.name.to_string(),
                segment: (*segment).to_string(),
            })?;
            let target = self.graph.model(rel.target)?;
            let alias = if prefix.is_empty() {
                (*segment).to_string()
            } else {
                format!("{prefix}{PATH_SEPARATOR}{segment}")
            };
            hops.push(RelationHop {
                alias: alias.clone(),
                parent_qualifier: qualifier,
                target_model: target.name,
                table: target.table,
                local_column: rel.local_column,
                target_column: rel.target_column,
            });
            qualifier = alias.clone();
            prefix = alias;
            model = target;
        }

        Ok((hops, model, qualifier, segments[segments.len() - 1]))
    }
}
