//! Fraudwatch is a read-only JSON API over a table of card transactions.
//!
//! It backs a fraud analytics dashboard with three endpoints: a raw listing of
//! transactions, a fraud/non-fraud summary, and a date-range filtered feed
//! ordered by transaction time. See [endpoints] for the routes.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde::Serialize;
use tokio::signal;

mod app_state;
mod db;
pub mod endpoints;
mod fraud_summary;
mod logging;
mod not_found;
mod routing;
pub mod timestamp;
pub mod transaction;

pub use app_state::AppState;
pub use db::{ConnectionMode, ConnectionProvider, initialize as initialize_db};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use routing::{AllowedOrigins, InvalidOrigin, build_router, cors_layer};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A `start` or `end` query parameter was not an ISO-8601 date-time.
    #[error("the {parameter} parameter \"{value}\" is not an ISO-8601 date-time")]
    InvalidTimestamp {
        /// The name of the offending query parameter.
        parameter: &'static str,
        /// The value the client sent.
        value: String,
    },

    /// The database could not be opened, e.g. the file is missing or unreadable.
    ///
    /// The string holds the driver message and must only be logged.
    #[error("could not connect to the database: {0}")]
    Connection(String),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// A row returned by the database is missing a column of the transaction schema.
    #[error("the column \"{0}\" is missing from the result set")]
    MissingColumn(&'static str),

    /// A value returned by the database does not fit the type of its column.
    #[error("invalid value in column \"{column}\": {reason}")]
    InvalidColumnValue {
        /// The column holding the bad value.
        column: &'static str,
        /// What was wrong with the value.
        reason: String,
    },

    /// A value could not be represented as JSON.
    #[error("could not serialize as JSON: {0}")]
    Serialization(String),

    /// The database did not answer within the request timeout.
    #[error("the database query timed out")]
    QueryTimeout,

    /// The blocking task running the query panicked or was cancelled.
    #[error("the database task failed: {0}")]
    TaskFailed(String),

    /// The requested resource was not found.
    #[error("the requested resource could not be found")]
    NotFound,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(ref sql_error, _)
                if matches!(
                    sql_error.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::NotADatabase
                        | rusqlite::ErrorCode::PermissionDenied
                ) =>
            {
                tracing::error!("could not open the database: {}", value);
                Error::Connection(value.to_string())
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

/// The JSON body sent to clients when a request fails.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl Error {
    fn status_and_body(&self) -> (StatusCode, ErrorBody) {
        let (status, error, message) = match self {
            Error::InvalidTimestamp { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_timestamp", self.to_string())
            }
            Error::NotFound => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            Error::Connection(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "database_unavailable",
                "The database is unavailable, try again later.".to_owned(),
            ),
            Error::QueryTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                "The database did not respond in time, try again later.".to_owned(),
            ),
            Error::SqlError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "query_failed",
                "The query could not be executed, check the server logs for more details."
                    .to_owned(),
            ),
            Error::MissingColumn(_) | Error::InvalidColumnValue { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "invalid_row",
                "The stored data does not match the transaction schema.".to_owned(),
            ),
            Error::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_failed",
                "The stored data could not be converted to JSON.".to_owned(),
            ),
            Error::DatabaseLockError | Error::TaskFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An unexpected error occurred, check the server logs for more details."
                    .to_owned(),
            ),
        };

        (status, ErrorBody { error, message })
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();

        // Client errors are expected, anything else is not intended to be shown to the client.
        if status.is_server_error() {
            tracing::error!("An unexpected error occurred: {}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        (status, Json(body)).into_response()
    }
}
