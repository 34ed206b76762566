//! SQL rendering for validated query plans.
//!
//! The compiler is deterministic: the same plan always renders the same
//! statement text and parameter list. All identifiers are double-quoted; all
//! operands travel as bound parameters, never inlined into the text.
//!
//! Null-sensitive renderings worth calling out:
//! - `Exact(Null)` renders `IS NULL`, `NotExact(Null)` renders `IS NOT NULL`.
//! - `In([])` renders the constant-false `1 = 0`.
//! - `NotIn([])` renders `col IS NOT NULL`: an empty exclusion keeps every
//!   row with a value, but a null is excluded the same way SQL's three-valued
//!   `NOT IN` excludes it for any non-empty list.

use crate::query::compile::{NullPlacement, Predicate, SortExpression};
use crate::query::lookups::Lookup;
use crate::query::plan::QueryPlan;
use crate::value::Value;
use std::fmt::Write;

/// The parameter placeholder dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// Numbered placeholders: `$1`, `$2`, ...
    Postgres,
    /// Positional placeholders: `?`.
    Sqlite,
}

/// Renders [`QueryPlan`]s to SQL text plus a bound parameter list.
#[derive(Debug, Clone, Copy)]
pub struct SqlCompiler {
    style: ParamStyle,
}

impl SqlCompiler {
    /// Creates a compiler for the given placeholder dialect.
    pub const fn new(style: ParamStyle) -> Self {
        Self { style }
    }

    /// Renders a `SELECT` for the plan.
    pub fn select(&self, plan: &QueryPlan) -> (String, Vec<Value>) {
        let mut sql = String::from("SELECT ");
        let mut params = Vec::new();

        for (i, col) in plan.columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let _ = write!(sql, "{}", column_ref(&col.qualifier, &col.column));
            if col.output != col.column || col.qualifier != plan.root_table {
                let _ = write!(sql, " AS \"{}\"", col.output);
            }
        }

        let _ = write!(sql, " FROM \"{}\"", plan.root_table);
        self.render_joins(&mut sql, plan);
        self.render_where(&mut sql, plan, &mut params);
        self.render_order(&mut sql, &plan.ordering);
        self.render_pagination(&mut sql, plan.limit, plan.offset);

        (sql, params)
    }

    /// Renders a `SELECT COUNT(*)` for the plan, dropping ordering and
    /// pagination.
    pub fn count(&self, plan: &QueryPlan) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT COUNT(*) AS \"count\" FROM \"{}\"", plan.root_table);
        let mut params = Vec::new();
        self.render_joins(&mut sql, plan);
        self.render_where(&mut sql, plan, &mut params);
        (sql, params)
    }

    /// Renders an `INSERT` of the given column/value pairs.
    pub fn insert(&self, table: &str, fields: &[(String, Value)]) -> (String, Vec<Value>) {
        let mut sql = format!("INSERT INTO \"{table}\" (");
        let mut params = Vec::with_capacity(fields.len());
        for (i, (column, _)) in fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let _ = write!(sql, "\"{column}\"");
        }
        sql.push_str(") VALUES (");
        for (i, (_, value)) in fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            params.push(value.clone());
            let _ = write!(sql, "{}", self.placeholder(params.len()));
        }
        sql.push(')');
        (sql, params)
    }

    /// Renders an `UPDATE` of the given columns for the rows whose primary
    /// key is in `pks`. An empty key set renders a statement matching no
    /// rows.
    pub fn update_by_pk(
        &self,
        table: &str,
        pk_column: &str,
        fields: &[(String, Value)],
        pks: &[Value],
    ) -> (String, Vec<Value>) {
        let mut sql = format!("UPDATE \"{table}\" SET ");
        let mut params = Vec::with_capacity(fields.len() + pks.len());
        for (i, (column, value)) in fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            params.push(value.clone());
            let _ = write!(sql, "\"{column}\" = {}", self.placeholder(params.len()));
        }
        if pks.is_empty() {
            let _ = write!(sql, " WHERE 1 = 0");
            return (sql, params);
        }
        let _ = write!(sql, " WHERE \"{pk_column}\" IN (");
        for (i, pk) in pks.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            params.push(pk.clone());
            let _ = write!(sql, "{}", self.placeholder(params.len()));
        }
        sql.push(')');
        (sql, params)
    }

    fn placeholder(&self, index: usize) -> String {
        match self.style {
            ParamStyle::Postgres => format!("${index}"),
            ParamStyle::Sqlite => "?".to_string(),
        }
    }

    fn render_joins(&self, sql: &mut String, plan: &QueryPlan) {
        for join in &plan.joins {
            let _ = write!(
                sql,
                " {} \"{}\" AS \"{}\" ON {} = {}",
                join.kind.sql_keyword(),
                join.table,
                join.alias,
                column_ref(&join.parent_qualifier, join.local_column),
                column_ref(&join.alias, join.target_column),
            );
        }
    }

    fn render_where(&self, sql: &mut String, plan: &QueryPlan, params: &mut Vec<Value>) {
        for (i, predicate) in plan.predicates.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            let condition = self.render_predicate(predicate, params);
            sql.push_str(&condition);
        }
    }

    fn render_predicate(&self, predicate: &Predicate, params: &mut Vec<Value>) -> String {
        let col = column_ref(&predicate.target.qualifier, &predicate.target.column);
        match &predicate.lookup {
            Lookup::Exact(Value::Null) => format!("{col} IS NULL"),
            Lookup::Exact(value) => {
                params.push(value.clone());
                format!("{col} = {}", self.placeholder(params.len()))
            }
            Lookup::NotExact(Value::Null) => format!("{col} IS NOT NULL"),
            Lookup::NotExact(value) => {
                params.push(value.clone());
                format!("{col} <> {}", self.placeholder(params.len()))
            }
            Lookup::In(items) => {
                if items.is_empty() {
                    return "1 = 0".to_string();
                }
                format!("{col} IN ({})", self.placeholder_list(items, params))
            }
            Lookup::NotIn(items) => {
                if items.is_empty() {
                    return format!("{col} IS NOT NULL");
                }
                format!("{col} NOT IN ({})", self.placeholder_list(items, params))
            }
            Lookup::Gt(value) => {
                params.push(value.clone());
                format!("{col} > {}", self.placeholder(params.len()))
            }
            Lookup::Gte(value) => {
                params.push(value.clone());
                format!("{col} >= {}", self.placeholder(params.len()))
            }
            Lookup::Lt(value) => {
                params.push(value.clone());
                format!("{col} < {}", self.placeholder(params.len()))
            }
            Lookup::Lte(value) => {
                params.push(value.clone());
                format!("{col} <= {}", self.placeholder(params.len()))
            }
            Lookup::Is(value) => format!("{col} IS {}", identity_keyword(value)),
            Lookup::IsNot(value) => format!("{col} IS NOT {}", identity_keyword(value)),
            Lookup::IsNull(true) => format!("{col} IS NULL"),
            Lookup::IsNull(false) => format!("{col} IS NOT NULL"),
            Lookup::Like(pattern) => {
                params.push(Value::String(pattern.clone()));
                format!("{col} LIKE {}", self.placeholder(params.len()))
            }
            Lookup::ILike(pattern) => {
                params.push(Value::String(pattern.clone()));
                let ph = self.placeholder(params.len());
                match self.style {
                    ParamStyle::Postgres => format!("{col} ILIKE {ph}"),
                    ParamStyle::Sqlite => format!("LOWER({col}) LIKE LOWER({ph})"),
                }
            }
        }
    }

    fn placeholder_list(&self, items: &[Value], params: &mut Vec<Value>) -> String {
        let mut out = String::new();
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            params.push(item.clone());
            let _ = write!(out, "{}", self.placeholder(params.len()));
        }
        out
    }

    fn render_order(&self, sql: &mut String, ordering: &[SortExpression]) {
        for (i, expr) in ordering.iter().enumerate() {
            sql.push_str(if i == 0 { " ORDER BY " } else { ", " });
            let _ = write!(
                sql,
                "{} {}",
                column_ref(&expr.target.qualifier, &expr.target.column),
                if expr.descending { "DESC" } else { "ASC" },
            );
            match expr.nulls {
                Some(NullPlacement::First) => sql.push_str(" NULLS FIRST"),
                Some(NullPlacement::Last) => sql.push_str(" NULLS LAST"),
                None => {}
            }
        }
    }

    fn render_pagination(&self, sql: &mut String, limit: Option<usize>, offset: Option<usize>) {
        match (limit, offset) {
            (Some(limit), Some(offset)) => {
                let _ = write!(sql, " LIMIT {limit} OFFSET {offset}");
            }
            (Some(limit), None) => {
                let _ = write!(sql, " LIMIT {limit}");
            }
            (None, Some(offset)) => match self.style {
                // SQLite requires a LIMIT clause before OFFSET; -1 means
                // unlimited.
                ParamStyle::Sqlite => {
                    let _ = write!(sql, " LIMIT -1 OFFSET {offset}");
                }
                ParamStyle::Postgres => {
                    let _ = write!(sql, " OFFSET {offset}");
                }
            },
            (None, None) => {}
        }
    }
}

fn column_ref(qualifier: &str, column: &str) -> String {
    format!("\"{qualifier}\".\"{column}\"")
}

// operand shape validation restricts identity operands to booleans and null
fn identity_keyword(value: &Value) -> &'static str {
    match value {
        Value::Bool(true) => "TRUE",
        Value::Bool(false) => "FALSE",
        _ => "NULL",
    }
}
