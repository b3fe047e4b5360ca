//! Database start-up and access to connections for request handlers.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use clap::ValueEnum;
use rusqlite::{Connection, OpenFlags, params_from_iter, types::Value};

use crate::{Error, transaction::create_transaction_table};

/// Create the application tables if they do not exist yet.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    create_transaction_table(connection)
}

/// How request handlers get hold of a database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConnectionMode {
    /// Open a fresh read-only connection for every request and close it afterwards.
    PerRequest,
    /// Open one connection at start-up and share it between all requests.
    Shared,
}

/// Supplies connections to the relational store.
///
/// Both variants hand a `&Connection` to a closure and guarantee that the
/// connection is released when the closure returns, whether it succeeded or not.
#[derive(Debug, Clone)]
pub enum ConnectionProvider {
    /// A new read-only connection to the database file at `path` per call.
    ///
    /// The connection is owned by the call, so it is closed on every exit path.
    PerRequest {
        /// Path to the SQLite database file.
        path: PathBuf,
    },
    /// One long-lived connection shared by all requests.
    ///
    /// A `rusqlite::Connection` must not be used from two threads at once, so
    /// every request holds the mutex for the whole query. Concurrent requests
    /// therefore run one after the other in this mode.
    Shared(Arc<Mutex<Connection>>),
}

impl ConnectionProvider {
    /// A provider that opens the database at `path` for each request.
    pub fn per_request(path: impl AsRef<Path>) -> Self {
        Self::PerRequest {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// A provider that reuses `connection` for every request.
    pub fn shared(connection: Connection) -> Self {
        Self::Shared(Arc::new(Mutex::new(connection)))
    }

    /// Build the provider for `mode`.
    ///
    /// In [ConnectionMode::Shared] the connection is opened immediately.
    ///
    /// # Errors
    /// Returns [Error::Connection] if the shared connection cannot be opened.
    pub fn open(mode: ConnectionMode, path: impl AsRef<Path>) -> Result<Self, Error> {
        match mode {
            ConnectionMode::PerRequest => Ok(Self::per_request(path)),
            ConnectionMode::Shared => open_read_only(path.as_ref()).map(Self::shared),
        }
    }

    /// Run `f` with a connection.
    ///
    /// This blocks the calling thread on SQLite, so async callers should use
    /// [crate::AppState::query] which moves the work to the blocking pool.
    ///
    /// # Errors
    /// Returns [Error::Connection] if a per-request connection cannot be opened,
    /// [Error::DatabaseLockError] if the shared connection's lock is poisoned,
    /// or whatever `f` returns.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error>,
    {
        match self {
            Self::PerRequest { path } => {
                let connection = open_read_only(path)?;
                let result = f(&connection);

                if let Err((_, error)) = connection.close() {
                    tracing::warn!("could not cleanly close the database connection: {error}");
                }

                result
            }
            Self::Shared(connection) => {
                let connection = connection.lock().map_err(|_| Error::DatabaseLockError)?;
                f(&connection)
            }
        }
    }
}

fn open_read_only(path: &Path) -> Result<Connection, Error> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|error| {
        tracing::error!("could not open the database at {path:?}: {error}");
        Error::Connection(error.to_string())
    })
}

/// The raw output of a query: column names in select order and the row values.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    /// Column names in the order the statement selects them.
    pub columns: Vec<String>,
    /// Row values, each in the same order as `columns`.
    pub rows: Vec<Vec<Value>>,
}

/// Execute `sql` with positional `params` and collect every row untouched.
///
/// # Errors
/// Returns [Error::SqlError] if the statement cannot be prepared or executed.
pub fn execute_query(
    connection: &Connection,
    sql: &str,
    params: &[String],
) -> Result<RawResult, Error> {
    let mut statement = connection.prepare(sql)?;
    let columns: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let column_count = columns.len();

    let rows = statement
        .query_map(params_from_iter(params.iter()), |row| {
            (0..column_count)
                .map(|index| row.get::<usize, Value>(index))
                .collect::<Result<Vec<_>, _>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawResult { columns, rows })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rusqlite::{Connection, types::Value};

    use crate::Error;

    use super::{ConnectionMode, ConnectionProvider, execute_query, initialize};

    fn temp_db_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fraudwatch-db-{}-{name}.db", std::process::id()))
    }

    #[test]
    fn initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
    }

    #[test]
    fn execute_query_returns_columns_in_select_order() {
        let conn = Connection::open_in_memory().unwrap();

        let got = execute_query(&conn, "SELECT 1 AS b, 'x' AS a, NULL AS c", &[]).unwrap();

        assert_eq!(got.columns, vec!["b", "a", "c"]);
        assert_eq!(
            got.rows,
            vec![vec![
                Value::Integer(1),
                Value::Text("x".to_owned()),
                Value::Null
            ]]
        );
    }

    #[test]
    fn execute_query_binds_parameters() {
        let conn = Connection::open_in_memory().unwrap();

        let got = execute_query(
            &conn,
            "SELECT ?1 || '|' || ?2",
            &["left".to_owned(), "right".to_owned()],
        )
        .unwrap();

        assert_eq!(got.rows, vec![vec![Value::Text("left|right".to_owned())]]);
    }

    #[test]
    fn execute_query_reports_bad_sql() {
        let conn = Connection::open_in_memory().unwrap();

        let got = execute_query(&conn, "SELEC nothing", &[]);

        assert!(matches!(got, Err(Error::SqlError(_))));
    }

    #[test]
    fn per_request_missing_file_is_connection_error() {
        let provider = ConnectionProvider::per_request(temp_db_path("does-not-exist"));

        let got = provider.with_connection(|_| Ok(()));

        assert!(matches!(got, Err(Error::Connection(_))));
    }

    #[test]
    fn per_request_opens_read_only_connection() {
        let path = temp_db_path("read-only");
        let _ = std::fs::remove_file(&path);
        initialize(&Connection::open(&path).unwrap()).unwrap();
        let provider = ConnectionProvider::open(ConnectionMode::PerRequest, &path).unwrap();

        let read = provider.with_connection(|conn| execute_query(conn, "SELECT 1", &[]));
        let write = provider.with_connection(|conn| {
            conn.execute("DELETE FROM \"transaction\"", [])?;
            Ok(())
        });

        std::fs::remove_file(&path).unwrap();
        assert!(read.is_ok());
        assert!(matches!(write, Err(Error::SqlError(_))));
    }

    #[test]
    fn per_request_releases_connection_after_error() {
        let path = temp_db_path("release");
        let _ = std::fs::remove_file(&path);
        initialize(&Connection::open(&path).unwrap()).unwrap();
        let provider = ConnectionProvider::per_request(&path);

        let failed: Result<(), Error> = provider.with_connection(|_| Err(Error::QueryTimeout));
        // A writer can take an exclusive lock only if no reader is left open.
        let writer = Connection::open(&path).unwrap();
        let locked = writer.execute_batch("BEGIN EXCLUSIVE; COMMIT;");

        drop(writer);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(failed, Err(Error::QueryTimeout));
        assert!(locked.is_ok());
    }

    #[test]
    fn shared_connection_is_reused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE counter (n INTEGER)").unwrap();
        let provider = ConnectionProvider::shared(conn);

        provider
            .with_connection(|conn| {
                conn.execute("INSERT INTO counter VALUES (1)", [])?;
                Ok(())
            })
            .unwrap();
        let got = provider
            .with_connection(|conn| execute_query(conn, "SELECT COUNT(*) FROM counter", &[]))
            .unwrap();

        assert_eq!(got.rows, vec![vec![Value::Integer(1)]]);
    }

    #[test]
    fn shared_mode_with_missing_file_fails_at_start_up() {
        let got = ConnectionProvider::open(ConnectionMode::Shared, temp_db_path("missing-shared"));

        assert!(matches!(got, Err(Error::Connection(_))));
    }
}
