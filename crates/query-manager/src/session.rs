//! Session abstraction and the scoped broker.
//!
//! A [`Session`] is one live database conversation. The broker hands out
//! [`ScopedSession`]s for the duration of a single terminal operation and
//! encodes the ownership rule: a session the caller brought is borrowed and
//! never closed here; a session minted from a [`SessionFactory`] is owned by
//! the scope and always closed when the scope ends, on success and on
//! failure alike. Closing happens in `Drop`, so a future cancelled mid-await
//! still releases an owned session.

use crate::row::Row;
use crate::value::Value;
use async_trait::async_trait;
use query_manager_core::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One live database session.
///
/// `close` is synchronous and infallible so it can run from `Drop`; backends
/// that need teardown I/O do it best-effort there.
#[async_trait]
pub trait Session: Send {
    /// Runs a read statement and returns detached rows.
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Runs a write statement and returns the affected row count.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Runs an insert statement and returns the new row's primary key.
    async fn insert(&mut self, sql: &str, params: &[Value]) -> Result<Value>;

    /// Opens a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Releases the session's resources. Idempotent.
    fn close(&mut self);
}

/// Creates owned sessions on demand.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a fresh session.
    async fn create_session(&self) -> Result<Box<dyn Session>>;
}

/// A session shareable across scopes. The broker locks it for the duration
/// of each operation, serializing access.
pub type SharedSession = Arc<Mutex<Box<dyn Session>>>;

/// Wraps an existing session for sharing.
pub fn share(session: Box<dyn Session>) -> SharedSession {
    Arc::new(Mutex::new(session))
}

/// A session bound to one operation's scope.
pub enum ScopedSession {
    /// A borrowed session: locked for this scope, left open afterwards.
    Borrowed(OwnedMutexGuard<Box<dyn Session>>),
    /// An owned session: created for this scope, closed when it ends.
    Owned(Option<Box<dyn Session>>),
}

impl ScopedSession {
    /// The live session for this scope.
    ///
    /// # Panics
    ///
    /// Panics if called on an owned session after it was closed, which
    /// cannot happen outside this module.
    pub fn session(&mut self) -> &mut dyn Session {
        match self {
            Self::Borrowed(guard) => guard.as_mut(),
            Self::Owned(slot) => slot
                .as_mut()
                .map(|session| session.as_mut())
                .unwrap_or_else(|| unreachable!("owned session used after close")),
        }
    }

    /// Returns `true` if the scope owns (and will close) the session.
    pub const fn owns_resource(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Self::Owned(slot) = self {
            if let Some(mut session) = slot.take() {
                session.close();
            }
        }
    }
}

/// Decides where each operation's session comes from.
///
/// Resolution order: a session supplied to the call itself, then the
/// broker's shared session, then the factory. A broker configured with
/// neither a shared session nor a factory fails every acquire.
#[derive(Clone, Default)]
pub struct SessionBroker {
    shared: Option<SharedSession>,
    factory: Option<Arc<dyn SessionFactory>>,
}

impl SessionBroker {
    /// A broker with no resources configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures a long-lived shared session. Scopes borrow it; it is
    /// never closed by the broker.
    #[must_use]
    pub fn with_shared(mut self, session: SharedSession) -> Self {
        self.shared = Some(session);
        self
    }

    /// Configures a factory for per-operation owned sessions.
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Acquires a session for one operation's scope.
    pub async fn acquire(&self) -> Result<ScopedSession> {
        self.acquire_with(None).await
    }

    /// Acquires a session, preferring one supplied by the caller.
    pub async fn acquire_with(&self, supplied: Option<SharedSession>) -> Result<ScopedSession> {
        if let Some(session) = supplied.or_else(|| self.shared.clone()) {
            tracing::trace!(owned = false, "session acquired");
            return Ok(ScopedSession::Borrowed(session.lock_owned().await));
        }
        if let Some(factory) = &self.factory {
            let session = factory.create_session().await?;
            tracing::trace!(owned = true, "session acquired");
            return Ok(ScopedSession::Owned(Some(session)));
        }
        Err(Error::NoResourceConfigured)
    }
}
