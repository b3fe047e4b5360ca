//! Implements a struct that holds the state of the REST server.

use std::time::Duration;

use rusqlite::Connection;

use crate::{Error, db::ConnectionProvider};

/// How long a request may wait on the database when no timeout is configured.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Where request handlers get their database connections from.
    pub connections: ConnectionProvider,

    /// The longest a request waits for its database round trip.
    pub query_timeout: Duration,
}

impl AppState {
    /// Create a new [AppState] with the default query timeout.
    pub fn new(connections: ConnectionProvider) -> Self {
        Self {
            connections,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Replace the query timeout.
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    /// Run `f` against the database on the blocking thread pool.
    ///
    /// The connection is released as soon as `f` returns, even if the request
    /// has already given up waiting.
    ///
    /// # Errors
    /// Returns [Error::QueryTimeout] if `f` does not finish within
    /// [AppState::query_timeout], [Error::TaskFailed] if it panics, or any
    /// error from acquiring the connection or from `f` itself.
    pub async fn query<T, F>(&self, f: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, Error> + Send + 'static,
    {
        let connections = self.connections.clone();
        let task = tokio::task::spawn_blocking(move || connections.with_connection(f));

        match tokio::time::timeout(self.query_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Error::TaskFailed(join_error.to_string())),
            Err(_) => Err(Error::QueryTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rusqlite::Connection;

    use crate::{Error, db::ConnectionProvider};

    use super::AppState;

    fn get_test_state() -> AppState {
        AppState::new(ConnectionProvider::shared(
            Connection::open_in_memory().unwrap(),
        ))
    }

    #[tokio::test]
    async fn query_returns_closure_result() {
        let state = get_test_state();

        let got = state
            .query(|conn| Ok(conn.query_row("SELECT 40 + 2", [], |row| row.get::<_, i64>(0))?))
            .await;

        assert_eq!(got, Ok(42));
    }

    #[tokio::test]
    async fn slow_query_times_out() {
        let state = get_test_state().with_query_timeout(Duration::from_millis(10));

        let got = state
            .query(|_| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await;

        assert_eq!(got, Err(Error::QueryTimeout));
    }

    #[tokio::test]
    async fn panicking_query_is_reported() {
        let state = get_test_state();

        let got: Result<(), Error> = state.query(|_| panic!("boom")).await;

        assert!(matches!(got, Err(Error::TaskFailed(_))));
    }
}
