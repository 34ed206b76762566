//! The query compilation pipeline, from dotted keys to rendered SQL.
//!
//! Stages run in order: [`paths`] resolves dotted keys against the model
//! graph, [`lookups`] validates operator suffixes and operand shapes,
//! [`compile`] produces predicates and ordering terms, [`joins`] assembles
//! the deduplicated join list, [`plan`] ties everything into a validated
//! [`plan::QueryPlan`], and [`sql`] renders it.

pub mod compile;
pub mod joins;
pub mod lookups;
pub mod paths;
pub mod plan;
pub mod sql;

pub use compile::{NullPlacement, Predicate, SortExpression, SortKey};
pub use joins::{JoinDirective, JoinKind, JoinStep};
pub use lookups::Lookup;
pub use paths::{FieldRef, PathResolver, RelationHop};
pub use plan::{PlanBuilder, QueryPlan, SelectColumn, StagedQuery};
pub use sql::{ParamStyle, SqlCompiler};
