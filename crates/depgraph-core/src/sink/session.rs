//! SQLite connection lifecycle shared by both sinks.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ExportError, Stage};
use crate::retry::{RetryExecutor, RetryPolicy};

/// Busy timeout applied to every backend connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns at most one open connection plus the executor every backend call
/// goes through.
#[derive(Debug)]
pub struct Session {
    path: PathBuf,
    bootstrap_sql: &'static str,
    conn: Option<Connection>,
    executor: RetryExecutor,
}

impl Session {
    pub fn new(path: impl Into<PathBuf>, bootstrap_sql: &'static str, policy: RetryPolicy) -> Self {
        Self {
            path: path.into(),
            bootstrap_sql,
            conn: None,
            executor: RetryExecutor::new(policy),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the database, configure it and bootstrap the layout. Calling
    /// this on a connected session is a no-op.
    pub fn connect(&mut self) -> Result<(), ExportError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let path = self.path.as_path();
        let bootstrap_sql = self.bootstrap_sql;
        let conn = self
            .executor
            .run(Stage::Connect.as_str(), |_| open_connection(path, bootstrap_sql))
            .map_err(|failure| ExportError::from_failure(Stage::Connect, failure))?;

        tracing::info!(path = %self.path.display(), "connected to backend");
        self.conn = Some(conn);
        Ok(())
    }

    /// Run `op` against the open connection through the retry executor.
    /// `op` must be safe to repeat: every write it makes has to sit inside a
    /// transaction that is rolled back when the attempt fails.
    pub fn run<T>(
        &mut self,
        stage: Stage,
        mut op: impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, ExportError> {
        let Self { conn, executor, .. } = self;
        let conn = conn.as_mut().ok_or(ExportError::NotConnected)?;
        executor
            .run(stage.as_str(), |_| op(&mut *conn))
            .map_err(|failure| ExportError::from_failure(stage, failure))
    }

    /// Drop the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_conn, err)) = conn.close() {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "backend close reported an error"
                );
            } else {
                tracing::debug!(path = %self.path.display(), "backend connection closed");
            }
        }
    }
}

fn open_connection(path: &Path, bootstrap_sql: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    configure_connection(&conn)?;
    conn.execute_batch(bootstrap_sql)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::schema::RELATIONAL_SCHEMA_SQL;
    use tempfile::TempDir;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::ZERO)
    }

    #[test]
    fn connect_sets_wal_busy_timeout_and_fk() {
        let dir = TempDir::new().expect("tempdir");
        let mut session = Session::new(
            dir.path().join("s.sqlite3"),
            RELATIONAL_SCHEMA_SQL,
            quick_policy(),
        );
        session.connect().expect("connect");

        let (journal, busy, fk) = session
            .run(Stage::Query, |conn| {
                let journal: String =
                    conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?;
                let busy: u64 = conn.pragma_query_value(None, "busy_timeout", |row| row.get(0))?;
                let fk: i64 = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
                Ok((journal, busy, fk))
            })
            .expect("pragmas");

        assert_eq!(journal.to_ascii_lowercase(), "wal");
        assert_eq!(u128::from(busy), DEFAULT_BUSY_TIMEOUT.as_millis());
        assert_eq!(fk, 1);
    }

    #[test]
    fn run_before_connect_is_not_connected() {
        let mut session = Session::new("unused.sqlite3", RELATIONAL_SCHEMA_SQL, quick_policy());
        let err = session.run(Stage::Query, |_| Ok(())).expect_err("not connected");
        assert!(matches!(err, ExportError::NotConnected));
    }

    #[test]
    fn close_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let mut session = Session::new(
            dir.path().join("s.sqlite3"),
            RELATIONAL_SCHEMA_SQL,
            quick_policy(),
        );
        session.connect().expect("connect");
        assert!(session.is_connected());
        session.close();
        session.close();
        assert!(!session.is_connected());
    }

    #[test]
    fn missing_parent_directory_exhausts_retries() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("missing").join("db.sqlite3");
        let mut session = Session::new(path, RELATIONAL_SCHEMA_SQL, quick_policy());
        let err = session.connect().expect_err("cannot open");
        assert!(matches!(
            err,
            ExportError::Connection { stage: Stage::Connect, attempts: 2, .. }
        ));
    }
}
