//! Synchronous adapter over the async manager.
//!
//! [`BlockingQueryManager`] owns a small current-thread runtime and drives
//! each terminal to completion on it, so callers outside any async context
//! get the same staging and session semantics with plain blocking calls.
//! Must not be used from within an async runtime.

use crate::graph::{Entity, ModelGraph};
use crate::manager::{ProjectedQueryManager, QueryManager};
use crate::query::compile::SortKey;
use crate::query::sql::ParamStyle;
use crate::row::Row;
use crate::session::SessionBroker;
use crate::value::Value;
use query_manager_core::{Error, Result};
use std::sync::Arc;

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Connection(format!("failed to start blocking runtime: {e}")))
}

/// A blocking counterpart to [`QueryManager`].
pub struct BlockingQueryManager<M: Entity> {
    runtime: Arc<tokio::runtime::Runtime>,
    inner: QueryManager<M>,
}

impl<M: Entity> Clone for BlockingQueryManager<M> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            inner: self.inner.clone(),
        }
    }
}

impl<M: Entity> BlockingQueryManager<M> {
    /// Creates a blocking manager with its own runtime.
    pub fn new(graph: Arc<ModelGraph>, broker: SessionBroker, style: ParamStyle) -> Result<Self> {
        Ok(Self {
            runtime: Arc::new(runtime()?),
            inner: QueryManager::new(graph, broker, style),
        })
    }

    /// Wraps an existing async manager.
    pub fn from_async(inner: QueryManager<M>) -> Result<Self> {
        Ok(Self {
            runtime: Arc::new(runtime()?),
            inner,
        })
    }

    // ── builders ───────────────────────────────────────────────────────

    /// See [`QueryManager::filter`].
    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner = self.inner.filter(key, value);
        self
    }

    /// See [`QueryManager::order_by`].
    #[must_use]
    pub fn order_by<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner = self.inner.order_by(keys);
        self
    }

    /// See [`QueryManager::order_by_key`].
    #[must_use]
    pub fn order_by_key(mut self, key: SortKey) -> Self {
        self.inner = self.inner.order_by_key(key);
        self
    }

    /// See [`QueryManager::limit`].
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.inner = self.inner.limit(limit);
        self
    }

    /// See [`QueryManager::offset`].
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.inner = self.inner.offset(offset);
        self
    }

    /// See [`QueryManager::inner_join`].
    #[must_use]
    pub fn inner_join(mut self, path: impl Into<String>) -> Self {
        self.inner = self.inner.inner_join(path);
        self
    }

    /// See [`QueryManager::left_join`].
    #[must_use]
    pub fn left_join(mut self, path: impl Into<String>) -> Self {
        self.inner = self.inner.left_join(path);
        self
    }

    /// See [`QueryManager::full_join`].
    #[must_use]
    pub fn full_join(mut self, path: impl Into<String>) -> Self {
        self.inner = self.inner.full_join(path);
        self
    }

    /// See [`QueryManager::only`]. The chain switches to row-shaped results.
    #[must_use]
    pub fn only<I, S>(self, paths: I) -> BlockingProjectedQueryManager<M>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BlockingProjectedQueryManager {
            runtime: self.runtime,
            inner: self.inner.only(paths),
        }
    }

    // ── terminals ──────────────────────────────────────────────────────

    /// See [`QueryManager::all`].
    pub fn all(&self) -> Result<Vec<M>> {
        self.runtime.block_on(self.inner.all())
    }

    /// See [`QueryManager::first`].
    pub fn first(&self) -> Result<Option<M>> {
        self.runtime.block_on(self.inner.first())
    }

    /// See [`QueryManager::last`].
    pub fn last(&self) -> Result<Option<M>> {
        self.runtime.block_on(self.inner.last())
    }

    /// See [`QueryManager::get`].
    pub fn get<K, V, I>(&self, filters: I) -> Result<Option<M>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.runtime.block_on(self.inner.get(filters))
    }

    /// See [`QueryManager::count`].
    pub fn count(&self) -> Result<u64> {
        self.runtime.block_on(self.inner.count())
    }

    /// See [`QueryManager::create`].
    pub fn create<K, V, I>(&self, fields: I) -> Result<M>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.runtime.block_on(self.inner.create(fields))
    }

    /// See [`QueryManager::update`].
    pub fn update<K, V, I>(&self, changes: I) -> Result<Vec<M>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.runtime.block_on(self.inner.update(changes))
    }
}

/// A blocking counterpart to [`ProjectedQueryManager`].
pub struct BlockingProjectedQueryManager<M: Entity> {
    runtime: Arc<tokio::runtime::Runtime>,
    inner: ProjectedQueryManager<M>,
}

impl<M: Entity> BlockingProjectedQueryManager<M> {
    /// See [`ProjectedQueryManager::filter`].
    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner = self.inner.filter(key, value);
        self
    }

    /// See [`ProjectedQueryManager::order_by`].
    #[must_use]
    pub fn order_by<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner = self.inner.order_by(keys);
        self
    }

    /// See [`ProjectedQueryManager::limit`].
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.inner = self.inner.limit(limit);
        self
    }

    /// See [`ProjectedQueryManager::offset`].
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.inner = self.inner.offset(offset);
        self
    }

    /// See [`ProjectedQueryManager::only`].
    #[must_use]
    pub fn only<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner = self.inner.only(paths);
        self
    }

    /// See [`ProjectedQueryManager::all`].
    pub fn all(&self) -> Result<Vec<Row>> {
        self.runtime.block_on(self.inner.all())
    }

    /// See [`ProjectedQueryManager::first`].
    pub fn first(&self) -> Result<Option<Row>> {
        self.runtime.block_on(self.inner.first())
    }

    /// See [`ProjectedQueryManager::last`].
    pub fn last(&self) -> Result<Option<Row>> {
        self.runtime.block_on(self.inner.last())
    }
}
