//! The model graph: typed metadata the path resolver walks.
//!
//! Filters and order keys reference models and relations by name
//! (`group__owner__first_name`), so the layer needs a queryable description
//! of every model: its scalar fields and its named relations with target
//! model and join keys. [`ModelGraph`] is that description. Lookups are
//! explicit and fail closed with typed errors; there is no reflective
//! attribute access anywhere in path resolution.
//!
//! The graph may contain cycles (self-referencing or mutually referencing
//! relations); any single traversal is bounded by the key's segment count.

use crate::row::Row;
use query_manager_core::{Error, Result};
use std::collections::HashMap;

/// A scalar field on a model.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The column name.
    pub name: &'static str,
    /// Whether this field is the primary key.
    pub primary_key: bool,
}

impl FieldDef {
    /// Creates a new field definition.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            primary_key: false,
        }
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// The cardinality of a relation, as seen from the source model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Source rows reference one target row (foreign key on the source).
    ManyToOne,
    /// Exactly one target row per source row.
    OneToOne,
    /// Target rows reference the source (foreign key on the target).
    OneToMany,
}

/// A named relation from one model to another.
#[derive(Debug, Clone)]
pub struct RelationDef {
    /// The relation name used in dotted keys.
    pub name: &'static str,
    /// The target model's name in the graph.
    pub target: &'static str,
    /// Relation cardinality.
    pub cardinality: Cardinality,
    /// The join column on the source model's table.
    pub local_column: &'static str,
    /// The join column on the target model's table.
    pub target_column: &'static str,
}

impl RelationDef {
    /// A many-to-one relation: the source table holds the foreign key.
    pub const fn many_to_one(
        name: &'static str,
        target: &'static str,
        local_column: &'static str,
        target_column: &'static str,
    ) -> Self {
        Self {
            name,
            target,
            cardinality: Cardinality::ManyToOne,
            local_column,
            target_column,
        }
    }

    /// A one-to-one relation.
    pub const fn one_to_one(
        name: &'static str,
        target: &'static str,
        local_column: &'static str,
        target_column: &'static str,
    ) -> Self {
        Self {
            name,
            target,
            cardinality: Cardinality::OneToOne,
            local_column,
            target_column,
        }
    }

    /// A one-to-many relation: the target table holds the foreign key.
    pub const fn one_to_many(
        name: &'static str,
        target: &'static str,
        local_column: &'static str,
        target_column: &'static str,
    ) -> Self {
        Self {
            name,
            target,
            cardinality: Cardinality::OneToMany,
            local_column,
            target_column,
        }
    }
}

/// Metadata for one model: table name, fields, and relations.
///
/// Relation names are unique within a model; `relation()` returns the first
/// definition with a matching name.
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// The model's name in the graph (the key filters are resolved against).
    pub name: &'static str,
    /// The database table name.
    pub table: &'static str,
    fields: Vec<FieldDef>,
    relations: Vec<RelationDef>,
}

impl ModelDef {
    /// Creates a new model definition.
    pub const fn new(name: &'static str, table: &'static str) -> Self {
        Self {
            name,
            table,
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Looks up a field by name.
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a relation by name.
    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Returns the primary key column name.
    ///
    /// Defaults to `"id"` when no field is flagged as the primary key.
    pub fn primary_key(&self) -> &'static str {
        self.fields
            .iter()
            .find(|f| f.primary_key)
            .map_or("id", |f| f.name)
    }

    /// Returns the model's column names in declaration order.
    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }
}

/// The registry of all models reachable by path resolution.
///
/// Built once at startup and treated as static for the duration of any call.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    models: HashMap<&'static str, ModelDef>,
}

impl ModelGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model definition, replacing any previous definition with
    /// the same name.
    #[must_use]
    pub fn register(mut self, model: ModelDef) -> Self {
        self.models.insert(model.name, model);
        self
    }

    /// Looks up a model by name.
    pub fn model(&self, name: &str) -> Result<&ModelDef> {
        self.models
            .get(name)
            .ok_or_else(|| Error::UnknownModel { model: name.to_string() })
    }
}

/// A typed entity that can be materialized from a detached [`Row`].
///
/// Materializing through `from_row` copies every selected column out of the
/// result set, so the returned value stays fully readable after the session
/// that produced it is closed.
pub trait Entity: Sized + Send + Sync + 'static {
    /// The model name this entity maps to in the [`ModelGraph`].
    fn model() -> &'static str;

    /// Constructs an entity from a result row.
    fn from_row(row: &Row) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_model() -> ModelDef {
        ModelDef::new("item", "items")
            .field(FieldDef::new("id").primary_key())
            .field(FieldDef::new("name"))
            .field(FieldDef::new("number"))
            .relation(RelationDef::many_to_one("group", "group", "group_id", "id"))
    }

    #[test]
    fn test_field_lookup() {
        let model = item_model();
        assert!(model.field_def("name").is_some());
        assert!(model.field_def("missing").is_none());
    }

    #[test]
    fn test_relation_lookup() {
        let model = item_model();
        let rel = model.relation_def("group").unwrap();
        assert_eq!(rel.target, "group");
        assert_eq!(rel.local_column, "group_id");
        assert_eq!(rel.cardinality, Cardinality::ManyToOne);
    }

    #[test]
    fn test_primary_key() {
        assert_eq!(item_model().primary_key(), "id");
        let no_pk = ModelDef::new("x", "xs").field(FieldDef::new("a"));
        assert_eq!(no_pk.primary_key(), "id");
    }

    #[test]
    fn test_graph_lookup() {
        let graph = ModelGraph::new().register(item_model());
        assert!(graph.model("item").is_ok());
        let err = graph.model("ghost").unwrap_err();
        assert!(matches!(err, Error::UnknownModel { .. }));
    }

    #[test]
    fn test_column_names_order() {
        assert_eq!(item_model().column_names(), vec!["id", "name", "number"]);
    }
}
