//! The query manager façade.
//!
//! [`QueryManager`] is the chainable entry point: builder calls stage state
//! without validating or touching a session, and terminal operations compile
//! the staged state into a plan, acquire a scoped session from the broker,
//! execute, and return detached results. Every terminal has a `_within`
//! variant that runs against a caller-supplied shared session instead of the
//! broker's own resources.
//!
//! `only()` moves the chain into [`ProjectedQueryManager`], whose terminals
//! return raw [`Row`]s; the unprojected manager returns typed entities.

use crate::graph::{Entity, ModelGraph};
use crate::query::compile::SortKey;
use crate::query::joins::JoinKind;
use crate::query::plan::{PlanBuilder, QueryPlan, StagedQuery};
use crate::query::sql::{ParamStyle, SqlCompiler};
use crate::row::Row;
use crate::session::{ScopedSession, SessionBroker, SharedSession};
use crate::value::Value;
use query_manager_core::{Error, Result};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::Instrument;

/// A lazy, chainable query over one entity type.
pub struct QueryManager<M: Entity> {
    graph: Arc<ModelGraph>,
    broker: SessionBroker,
    compiler: SqlCompiler,
    staged: StagedQuery,
    _entity: PhantomData<fn() -> M>,
}

impl<M: Entity> Clone for QueryManager<M> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            broker: self.broker.clone(),
            compiler: self.compiler,
            staged: self.staged.clone(),
            _entity: PhantomData,
        }
    }
}

impl<M: Entity> QueryManager<M> {
    /// Creates a manager over the given graph and session broker.
    pub fn new(graph: Arc<ModelGraph>, broker: SessionBroker, style: ParamStyle) -> Self {
        Self {
            graph,
            broker,
            compiler: SqlCompiler::new(style),
            staged: StagedQuery::default(),
            _entity: PhantomData,
        }
    }

    // ── builders ───────────────────────────────────────────────────────

    /// Stages an AND-combined filter entry. Re-filtering the same key
    /// replaces the staged value.
    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.staged.merge_filter(key, value);
        self
    }

    /// Stages sort keys in string form; a leading `-` means descending.
    #[must_use]
    pub fn order_by<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.staged.push_order(SortKey::parse(key.as_ref()));
        }
        self
    }

    /// Stages a structured sort key, for explicit null placement.
    #[must_use]
    pub fn order_by_key(mut self, key: SortKey) -> Self {
        self.staged.push_order(key);
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.staged.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.staged.offset = Some(offset);
        self
    }

    /// Stages an explicit inner join along a relation path.
    #[must_use]
    pub fn inner_join(mut self, path: impl Into<String>) -> Self {
        self.staged.push_join(path, JoinKind::Inner);
        self
    }

    /// Stages an explicit left outer join along a relation path.
    #[must_use]
    pub fn left_join(mut self, path: impl Into<String>) -> Self {
        self.staged.push_join(path, JoinKind::Left);
        self
    }

    /// Stages an explicit full outer join along a relation path.
    #[must_use]
    pub fn full_join(mut self, path: impl Into<String>) -> Self {
        self.staged.push_join(path, JoinKind::Full);
        self
    }

    /// Restricts the selection to the given field or relation paths. The
    /// chain switches to row-shaped results.
    #[must_use]
    pub fn only<I, S>(mut self, paths: I) -> ProjectedQueryManager<M>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.staged.push_fields(paths);
        ProjectedQueryManager { inner: self }
    }

    // ── terminals ──────────────────────────────────────────────────────

    /// Runs the staged query and returns all matching entities.
    pub async fn all(&self) -> Result<Vec<M>> {
        self.all_scoped(None).await
    }

    /// Like [`all`](Self::all), on a caller-supplied session.
    pub async fn all_within(&self, session: &SharedSession) -> Result<Vec<M>> {
        self.all_scoped(Some(Arc::clone(session))).await
    }

    /// Returns the first matching entity, if any.
    pub async fn first(&self) -> Result<Option<M>> {
        self.first_scoped(None).await
    }

    /// Like [`first`](Self::first), on a caller-supplied session.
    pub async fn first_within(&self, session: &SharedSession) -> Result<Option<M>> {
        self.first_scoped(Some(Arc::clone(session))).await
    }

    /// Returns the newest matching entity: staged ordering is replaced by a
    /// descending sort on the primary key.
    pub async fn last(&self) -> Result<Option<M>> {
        self.last_scoped(None).await
    }

    /// Like [`last`](Self::last), on a caller-supplied session.
    pub async fn last_within(&self, session: &SharedSession) -> Result<Option<M>> {
        self.last_scoped(Some(Arc::clone(session))).await
    }

    /// One-shot lookup by the given filters, ignoring staged state.
    pub async fn get<K, V, I>(&self, filters: I) -> Result<Option<M>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.get_scoped(filters, None).await
    }

    /// Like [`get`](Self::get), on a caller-supplied session.
    pub async fn get_within<K, V, I>(&self, filters: I, session: &SharedSession) -> Result<Option<M>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.get_scoped(filters, Some(Arc::clone(session))).await
    }

    /// Counts the rows matching the staged filters.
    pub async fn count(&self) -> Result<u64> {
        self.count_scoped(None).await
    }

    /// Like [`count`](Self::count), on a caller-supplied session.
    pub async fn count_within(&self, session: &SharedSession) -> Result<u64> {
        self.count_scoped(Some(Arc::clone(session))).await
    }

    /// Inserts a row and returns the stored entity, re-read by primary key.
    ///
    /// On an owned session the insert runs in its own transaction. A
    /// borrowed session's transactional state is left entirely to the
    /// caller.
    pub async fn create<K, V, I>(&self, fields: I) -> Result<M>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.create_scoped(fields, None).await
    }

    /// Like [`create`](Self::create), on a caller-supplied session.
    pub async fn create_within<K, V, I>(&self, fields: I, session: &SharedSession) -> Result<M>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.create_scoped(fields, Some(Arc::clone(session))).await
    }

    /// Applies the given changes to every row matching the staged filters
    /// and returns the updated entities in primary-key order.
    ///
    /// Transaction handling follows the same ownership rule as
    /// [`create`](Self::create).
    pub async fn update<K, V, I>(&self, changes: I) -> Result<Vec<M>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.update_scoped(changes, None).await
    }

    /// Like [`update`](Self::update), on a caller-supplied session.
    pub async fn update_within<K, V, I>(&self, changes: I, session: &SharedSession) -> Result<Vec<M>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.update_scoped(changes, Some(Arc::clone(session))).await
    }

    // ── execution ──────────────────────────────────────────────────────

    fn builder(&self) -> Result<PlanBuilder<'_>> {
        PlanBuilder::new(&self.graph, M::model())
    }

    async fn fetch(
        &self,
        plan: &QueryPlan,
        supplied: Option<SharedSession>,
        operation: &'static str,
    ) -> Result<Vec<Row>> {
        let span = query_manager_core::logging::query_span(plan.root_model, operation);
        let (sql, params) = self.compiler.select(plan);
        async {
            tracing::debug!(%sql, params = params.len(), "executing select");
            let mut scoped = self.broker.acquire_with(supplied).await?;
            scoped.session().query(&sql, &params).await
        }
        .instrument(span)
        .await
    }

    fn materialize(rows: &[Row]) -> Result<Vec<M>> {
        rows.iter().map(M::from_row).collect()
    }

    async fn all_scoped(&self, supplied: Option<SharedSession>) -> Result<Vec<M>> {
        let plan = self.builder()?.build(&self.staged)?;
        let rows = self.fetch(&plan, supplied, "all").await?;
        Self::materialize(&rows)
    }

    async fn first_scoped(&self, supplied: Option<SharedSession>) -> Result<Option<M>> {
        let plan = self.builder()?.build_first(&self.staged)?;
        let rows = self.fetch(&plan, supplied, "first").await?;
        rows.first().map(M::from_row).transpose()
    }

    async fn last_scoped(&self, supplied: Option<SharedSession>) -> Result<Option<M>> {
        let plan = self.builder()?.build_last(&self.staged)?;
        let rows = self.fetch(&plan, supplied, "last").await?;
        rows.first().map(M::from_row).transpose()
    }

    async fn get_scoped<K, V, I>(
        &self,
        filters: I,
        supplied: Option<SharedSession>,
    ) -> Result<Option<M>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let filters: Vec<(String, Value)> = filters
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let plan = self.builder()?.build_get(&filters)?;
        let rows = self.fetch(&plan, supplied, "get").await?;
        rows.first().map(M::from_row).transpose()
    }

    async fn count_scoped(&self, supplied: Option<SharedSession>) -> Result<u64> {
        let plan = self.builder()?.build(&self.staged)?;
        let span = query_manager_core::logging::query_span(plan.root_model, "count");
        let (sql, params) = self.compiler.count(&plan);
        async {
            tracing::debug!(%sql, "executing count");
            let mut scoped = self.broker.acquire_with(supplied).await?;
            let rows = scoped.session().query(&sql, &params).await?;
            let count: i64 = rows
                .first()
                .ok_or_else(|| Error::Database("count query returned no rows".to_string()))?
                .get("count")?;
            u64::try_from(count).map_err(|e| Error::Database(format!("negative count: {e}")))
        }
        .instrument(span)
        .await
    }

    async fn create_scoped<K, V, I>(&self, fields: I, supplied: Option<SharedSession>) -> Result<M>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let fields: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let builder = self.builder()?;
        let table = builder.root().table;
        let pk_column = builder.root().primary_key();

        let span = query_manager_core::logging::query_span(M::model(), "create");
        async {
            let mut scoped = self.broker.acquire_with(supplied).await?;
            // transactional state on a borrowed session belongs to the caller
            let owns = scoped.owns_resource();

            let (sql, params) = self.compiler.insert(table, &fields);
            tracing::debug!(%sql, "executing insert");
            if owns {
                scoped.session().begin().await?;
            }
            let pk = match scoped.session().insert(&sql, &params).await {
                Ok(pk) => pk,
                Err(err) => {
                    if owns {
                        rollback_quietly(&mut scoped).await;
                    }
                    return Err(err);
                }
            };
            if owns {
                scoped.session().commit().await?;
            }

            let plan = builder.build_get(&[(pk_column.to_string(), pk)])?;
            let (sql, params) = self.compiler.select(&plan);
            let rows = scoped.session().query(&sql, &params).await?;
            rows.first().map(M::from_row).transpose()?.ok_or_else(|| {
                Error::Database(format!("created row not found in table '{table}'"))
            })
        }
        .instrument(span)
        .await
    }

    async fn update_scoped<K, V, I>(
        &self,
        changes: I,
        supplied: Option<SharedSession>,
    ) -> Result<Vec<M>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let changes: Vec<(String, Value)> = changes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let builder = self.builder()?;
        let table = builder.root().table;
        let pk_column = builder.root().primary_key();

        let span = query_manager_core::logging::query_span(M::model(), "update");
        async {
            let mut scoped = self.broker.acquire_with(supplied).await?;
            // transactional state on a borrowed session belongs to the caller
            let owns = scoped.owns_resource();

            // Pin down the target rows first so joins and filters only have
            // to exist on the select side.
            let pk_plan = builder.build_pk_select(&self.staged)?;
            let (sql, params) = self.compiler.select(&pk_plan);
            let pk_rows = scoped.session().query(&sql, &params).await?;
            let mut pks = Vec::with_capacity(pk_rows.len());
            for row in &pk_rows {
                let pk = row.get_value(pk_column).cloned().ok_or_else(|| {
                    Error::Database(format!("primary key '{pk_column}' missing from row"))
                })?;
                pks.push(pk);
            }
            if pks.is_empty() {
                return Ok(Vec::new());
            }

            let (sql, params) = self.compiler.update_by_pk(table, pk_column, &changes, &pks);
            tracing::debug!(%sql, rows = pks.len(), "executing update");
            if owns {
                scoped.session().begin().await?;
            }
            if let Err(err) = scoped.session().execute(&sql, &params).await {
                if owns {
                    rollback_quietly(&mut scoped).await;
                }
                return Err(err);
            }
            if owns {
                scoped.session().commit().await?;
            }

            let mut refetch = StagedQuery::default();
            refetch.merge_filter(format!("{pk_column}__in"), Value::List(pks));
            refetch.push_order(SortKey::asc(pk_column));
            let plan = builder.build(&refetch)?;
            let (sql, params) = self.compiler.select(&plan);
            let rows = scoped.session().query(&sql, &params).await?;
            Self::materialize(&rows)
        }
        .instrument(span)
        .await
    }
}

async fn rollback_quietly(scoped: &mut ScopedSession) {
    if let Err(err) = scoped.session().rollback().await {
        tracing::warn!(%err, "rollback failed");
    }
}

/// A query chain with an explicit projection; terminals return raw rows.
pub struct ProjectedQueryManager<M: Entity> {
    inner: QueryManager<M>,
}

impl<M: Entity> Clone for ProjectedQueryManager<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: Entity> ProjectedQueryManager<M> {
    /// Stages an AND-combined filter entry.
    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner.staged.merge_filter(key, value);
        self
    }

    /// Stages sort keys in string form; a leading `-` means descending.
    #[must_use]
    pub fn order_by<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.inner.staged.push_order(SortKey::parse(key.as_ref()));
        }
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.inner.staged.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.inner.staged.offset = Some(offset);
        self
    }

    /// Adds further projection paths.
    #[must_use]
    pub fn only<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.staged.push_fields(paths);
        self
    }

    /// Runs the staged query and returns all matching rows.
    pub async fn all(&self) -> Result<Vec<Row>> {
        self.all_scoped(None).await
    }

    /// Like [`all`](Self::all), on a caller-supplied session.
    pub async fn all_within(&self, session: &SharedSession) -> Result<Vec<Row>> {
        self.all_scoped(Some(Arc::clone(session))).await
    }

    /// Returns the first matching row, if any.
    pub async fn first(&self) -> Result<Option<Row>> {
        self.first_scoped(None).await
    }

    /// Like [`first`](Self::first), on a caller-supplied session.
    pub async fn first_within(&self, session: &SharedSession) -> Result<Option<Row>> {
        self.first_scoped(Some(Arc::clone(session))).await
    }

    /// Returns the newest matching row by primary key.
    pub async fn last(&self) -> Result<Option<Row>> {
        self.last_scoped(None).await
    }

    /// Like [`last`](Self::last), on a caller-supplied session.
    pub async fn last_within(&self, session: &SharedSession) -> Result<Option<Row>> {
        self.last_scoped(Some(Arc::clone(session))).await
    }

    async fn all_scoped(&self, supplied: Option<SharedSession>) -> Result<Vec<Row>> {
        let plan = self.inner.builder()?.build(&self.inner.staged)?;
        self.inner.fetch(&plan, supplied, "all").await
    }

    async fn first_scoped(&self, supplied: Option<SharedSession>) -> Result<Option<Row>> {
        let plan = self.inner.builder()?.build_first(&self.inner.staged)?;
        let mut rows = self.inner.fetch(&plan, supplied, "first").await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn last_scoped(&self, supplied: Option<SharedSession>) -> Result<Option<Row>> {
        let plan = self.inner.builder()?.build_last(&self.inner.staged)?;
        let mut rows = self.inner.fetch(&plan, supplied, "last").await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }
}
