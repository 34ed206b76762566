//! # query-manager
//!
//! A declarative query-construction layer: chainable managers compile
//! `field__op` filter keys, dotted relation paths, and sort keys into
//! validated, parameterized SQL, and run them through a scoped session
//! broker with owned/borrowed resource semantics.
//!
//! ## Architecture
//!
//! Everything is lazy. A [`QueryManager`](manager::QueryManager) accumulates
//! a [`StagedQuery`](query::StagedQuery) through method chaining without
//! touching a session. A terminal method (`.all()`, `.first()`, `.count()`,
//! `.create()`, ...) validates the staged state into a
//! [`QueryPlan`](query::QueryPlan), renders it with the
//! [`SqlCompiler`](query::SqlCompiler) for the target placeholder dialect,
//! and executes it on a session acquired from the
//! [`SessionBroker`](session::SessionBroker). Sessions the caller supplies
//! are borrowed and left open; sessions minted from a factory are owned by
//! the operation's scope and always closed when it ends.
//!
//! ## Module Overview
//!
//! - [`graph`] - Model metadata: [`ModelGraph`](graph::ModelGraph), fields,
//!   relations, and the [`Entity`](graph::Entity) trait
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum
//! - [`row`] - Detached result [`Row`](row::Row)s
//! - [`query`] - Path resolution, lookups, join assembly, planning, SQL
//! - [`session`] - The [`Session`](session::Session) trait and broker
//! - [`manager`] - The chainable [`QueryManager`](manager::QueryManager)
//! - [`blocking`] - Synchronous adapter

// These clippy lints are intentionally allowed for this crate:
// - result_large_err: the layer error type is used consistently everywhere
// - cast_precision_loss: i64-to-f64 casts are acceptable for value coercion
// - format_push_string: format! with push_str is clearer for SQL generation
// - doc_markdown: backtick requirements for documentation items are too strict
// - needless_pass_by_value: builder signatures take owned keys and values
// - return_self_not_must_use: builder pattern methods are self-documenting
#![allow(clippy::result_large_err)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::use_self)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]
// significant_drop_tightening: false positives with async Mutex guards
#![allow(clippy::significant_drop_tightening)]

pub mod blocking;
pub mod graph;
pub mod manager;
pub mod query;
pub mod row;
pub mod session;
pub mod value;

pub use blocking::{BlockingProjectedQueryManager, BlockingQueryManager};
pub use graph::{Cardinality, Entity, FieldDef, ModelDef, ModelGraph, RelationDef};
pub use manager::{ProjectedQueryManager, QueryManager};
pub use query::{JoinKind, ParamStyle, SortKey, SqlCompiler, StagedQuery};
pub use query_manager_core::{Error, Result};
pub use row::{FromValue, Row};
pub use session::{share, ScopedSession, Session, SessionBroker, SessionFactory, SharedSession};
pub use value::Value;
