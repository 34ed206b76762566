//! SQLite session backend using `rusqlite`.
//!
//! [`SqliteSession`] implements the [`Session`] trait over a single
//! connection, running every statement via `tokio::task::spawn_blocking` so
//! the async runtime is never blocked. [`SqliteSessionFactory`] mints owned
//! per-scope sessions, either against a database file or against a named
//! shared in-memory database that survives between sessions (handy for
//! tests: the factory holds a keeper connection so the data outlives any
//! individual session).
//!
//! Features:
//! - WAL mode enabled by default for file-based databases
//! - foreign keys enforced on every connection
//! - closing a session drops its connection; closed sessions fail cleanly

#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]

use async_trait::async_trait;
use query_manager::row::Row;
use query_manager::session::{Session, SessionFactory};
use query_manager::value::Value;
use query_manager_core::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A SQLite-backed session over one connection.
///
/// The connection lives behind an async mutex so statements can run on the
/// blocking thread pool. `close` drops this session's handle; in-flight
/// statements finish against their own clone of the handle.
pub struct SqliteSession {
    conn: Option<Arc<Mutex<rusqlite::Connection>>>,
}

impl SqliteSession {
    /// Opens a session on the database at `path`, with WAL journal mode and
    /// foreign keys enabled.
    pub fn open(path: &str) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| Error::Connection(format!("sqlite open failed: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Connection(format!("failed to set pragmas: {e}")))?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a session on a private in-memory database.
    pub fn memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| Error::Connection(format!("sqlite open failed: {e}")))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Connection(format!("failed to set pragmas: {e}")))?;
        Ok(Self::from_connection(conn))
    }

    /// Wraps an already-open connection.
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Some(Arc::new(Mutex::new(conn))),
        }
    }

    fn handle(&self) -> Result<Arc<Mutex<rusqlite::Connection>>> {
        self.conn
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| Error::Connection("session is closed".to_string()))
    }

    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> Result<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string().as_str()),
                Value::DateTime(dt) => stmt.raw_bind_parameter(idx, dt.to_string().as_str()),
                Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string().as_str()),
                Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string().as_str()),
                // the SQL renderer flattens lists into per-item placeholders
                Value::List(_) => {
                    return Err(Error::Database(
                        "list values cannot be bound as a single parameter".to_string(),
                    ))
                }
            }
            .map_err(|e| Error::Database(format!("bind error: {e}")))?;
        }
        Ok(())
    }

    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values: Vec<Value> = (0..column_names.len())
            .map(|i| {
                let val_ref = sqlite_row
                    .get_ref(i)
                    .unwrap_or(rusqlite::types::ValueRef::Null);
                match val_ref {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                    rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                    rusqlite::types::ValueRef::Text(b) => {
                        Value::String(String::from_utf8_lossy(b).to_string())
                    }
                    rusqlite::types::ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                }
            })
            .collect();
        Row::new(column_names.to_vec(), values)
    }

    async fn run_execute(&self, sql: &str, params: &[Value], want_rowid: bool) -> Result<(u64, i64)> {
        let conn = self.handle()?;
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| Error::Database(e.to_string()))?;
            Self::bind_params(&mut stmt, &params)?;
            let count = stmt
                .raw_execute()
                .map_err(|e| Error::Database(e.to_string()))?;
            let rowid = if want_rowid { conn.last_insert_rowid() } else { 0 };
            Ok((count as u64, rowid))
        })
        .await
        .map_err(|e| Error::Database(format!("task join error: {e}")))?
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let conn = self.handle()?;
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| Error::Database(e.to_string()))?;

            let column_names: Vec<String> =
                stmt.column_names().into_iter().map(String::from).collect();

            Self::bind_params(&mut stmt, &params)?;

            let mut raw_rows = stmt.raw_query();
            let mut rows = Vec::new();
            while let Some(row) = raw_rows
                .next()
                .map_err(|e| Error::Database(e.to_string()))?
            {
                rows.push(Self::convert_row(row, &column_names));
            }
            Ok(rows)
        })
        .await
        .map_err(|e| Error::Database(format!("task join error: {e}")))?
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let (count, _) = self.run_execute(sql, params, false).await?;
        Ok(count)
    }

    async fn insert(&mut self, sql: &str, params: &[Value]) -> Result<Value> {
        let (_, rowid) = self.run_execute(sql, params, true).await?;
        Ok(Value::Int(rowid))
    }

    async fn begin(&mut self) -> Result<()> {
        self.execute("BEGIN", &[]).await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT", &[]).await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK", &[]).await?;
        Ok(())
    }

    fn close(&mut self) {
        if self.conn.take().is_some() {
            tracing::trace!("sqlite session closed");
        }
    }
}

/// Mints owned [`SqliteSession`]s for the broker.
pub struct SqliteSessionFactory {
    target: String,
    // keeps a named in-memory database alive while no session is open;
    // rusqlite connections are Send but not Sync, hence the mutex
    _keeper: Option<std::sync::Mutex<rusqlite::Connection>>,
}

impl SqliteSessionFactory {
    /// A factory opening sessions against the database file at `path`.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            target: path.into(),
            _keeper: None,
        }
    }

    /// A factory opening sessions against a named shared in-memory database.
    ///
    /// All sessions from this factory see the same data, and the data lives
    /// as long as the factory does.
    pub fn shared_memory(name: &str) -> Result<Self> {
        let target = format!("file:{name}?mode=memory&cache=shared");
        let keeper = rusqlite::Connection::open(&target)
            .map_err(|e| Error::Connection(format!("sqlite open failed: {e}")))?;
        Ok(Self {
            target,
            _keeper: Some(std::sync::Mutex::new(keeper)),
        })
    }

    fn is_memory(&self) -> bool {
        self.target.contains("mode=memory")
    }
}

#[async_trait]
impl SessionFactory for SqliteSessionFactory {
    async fn create_session(&self) -> Result<Box<dyn Session>> {
        let conn = rusqlite::Connection::open(&self.target)
            .map_err(|e| Error::Connection(format!("sqlite open failed: {e}")))?;
        let pragmas = if self.is_memory() {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"
        };
        conn.execute_batch(pragmas)
            .map_err(|e| Error::Connection(format!("failed to set pragmas: {e}")))?;
        tracing::trace!(target = %self.target, "sqlite session created");
        Ok(Box::new(SqliteSession::from_connection(conn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_round_trip() {
        let mut session = SqliteSession::memory().unwrap();
        session
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        session
            .execute("INSERT INTO t (name) VALUES (?)", &[Value::from("a")])
            .await
            .unwrap();
        let rows = session.query("SELECT id, name FROM t", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<i64>("id").unwrap(), 1);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "a");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_returns_rowid() {
        let mut session = SqliteSession::memory().unwrap();
        session
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        let pk = session
            .insert("INSERT INTO t (name) VALUES (?)", &[Value::from("a")])
            .await
            .unwrap();
        assert_eq!(pk, Value::Int(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_closed_session_fails_cleanly() {
        let mut session = SqliteSession::memory().unwrap();
        session.close();
        let err = session.query("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        // close is idempotent
        session.close();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_null_round_trip() {
        let mut session = SqliteSession::memory().unwrap();
        session
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v INTEGER)", &[])
            .await
            .unwrap();
        session
            .execute("INSERT INTO t (v) VALUES (?)", &[Value::Null])
            .await
            .unwrap();
        let rows = session.query("SELECT v FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get::<Option<i64>>("v").unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transaction_rollback() {
        let mut session = SqliteSession::memory().unwrap();
        session
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        session.begin().await.unwrap();
        session
            .execute("INSERT INTO t (id) VALUES (1)", &[])
            .await
            .unwrap();
        session.rollback().await.unwrap();
        let rows = session.query("SELECT id FROM t", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shared_memory_outlives_sessions() {
        let factory = SqliteSessionFactory::shared_memory("factory_smoke").unwrap();
        {
            let mut session = factory.create_session().await.unwrap();
            session
                .execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
                .await
                .unwrap();
            session
                .execute("INSERT INTO t (id) VALUES (7)", &[])
                .await
                .unwrap();
            session.close();
        }
        let mut session = factory.create_session().await.unwrap();
        let rows = session.query("SELECT id FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get::<i64>("id").unwrap(), 7);
    }
}
