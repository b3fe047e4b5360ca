//! Builds the SQL statements behind the transaction endpoints.
//!
//! Client supplied values only ever reach SQLite as bind parameters, the SQL
//! text is fixed at compile time.

use serde::Deserialize;

use crate::{Error, timestamp::Timestamp};

/// The most rows the date-range feed returns.
pub const DATA_ROW_LIMIT: usize = 1000;

/// The most rows the raw listing returns.
pub const LISTING_ROW_LIMIT: usize = 100;

/// Counts confirmed fraud against everything else.
///
/// Rows whose indicator is 0 or NULL count as non-fraudulent, so the two
/// counts always add up to the number of rows. `COALESCE` turns the NULL that
/// `SUM` gives for an empty table into 0.
pub const FRAUD_SUMMARY_QUERY: &str = "SELECT \
        COALESCE(SUM(CASE WHEN \"FraudIndicator\" = 1 THEN 1 ELSE 0 END), 0) AS fraudulent, \
        COALESCE(SUM(CASE WHEN \"FraudIndicator\" = 1 THEN 0 ELSE 1 END), 0) AS non_fraudulent \
    FROM \"transaction\"";

/// The optional `start` and `end` query parameters of the date-range feed, as sent.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryWindow {
    /// Inclusive lower bound, an ISO-8601 date-time.
    pub start: Option<String>,
    /// Inclusive upper bound, an ISO-8601 date-time.
    pub end: Option<String>,
}

/// A closed interval `[start, end]` of transaction times.
///
/// No ordering between the bounds is enforced, an inverted window simply
/// matches nothing. Stored times have microsecond precision, so `start` is
/// rounded up to a whole microsecond and `end` is cut down to one when bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive lower bound.
    pub start: Timestamp,
    /// Inclusive upper bound.
    pub end: Timestamp,
}

impl QueryWindow {
    /// Turn the raw parameters into a filter.
    ///
    /// The filter only applies when both bounds are given. A lone bound is
    /// ignored without being checked.
    ///
    /// # Errors
    /// Returns [Error::InvalidTimestamp] if both bounds are given and either is
    /// not an ISO-8601 date-time.
    pub fn validate(&self) -> Result<Option<TimeWindow>, Error> {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => {
                let start = parse_bound("start", start)?
                    .round_up_to_micros()
                    .ok_or_else(|| invalid_bound("start", start))?;

                Ok(Some(TimeWindow {
                    start,
                    end: parse_bound("end", end)?,
                }))
            }
            (None, None) => Ok(None),
            (start, end) => {
                tracing::debug!(
                    "ignoring partial date range start={start:?} end={end:?}, both bounds are required"
                );
                Ok(None)
            }
        }
    }
}

fn parse_bound(parameter: &'static str, value: &str) -> Result<Timestamp, Error> {
    Timestamp::parse(value).map_err(|_| invalid_bound(parameter, value))
}

fn invalid_bound(parameter: &'static str, value: &str) -> Error {
    Error::InvalidTimestamp {
        parameter,
        value: value.to_owned(),
    }
}

/// SQL text and the values to bind to its positional parameters, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// The SQL text, with `?N` placeholders.
    pub sql: String,
    /// The values for `?1`, `?2`, ...
    pub params: Vec<String>,
}

/// Select the transactions in `window`, oldest first, at most [DATA_ROW_LIMIT].
///
/// Ties on the timestamp are broken by transaction ID so repeated reads return
/// rows in the same order.
pub fn build_data_query(window: Option<&TimeWindow>) -> Statement {
    let order_and_limit =
        format!("ORDER BY \"Timestamp\" ASC, \"TransactionID\" ASC LIMIT {DATA_ROW_LIMIT}");

    match window {
        Some(window) => Statement {
            sql: format!(
                "SELECT * FROM \"transaction\" WHERE \"Timestamp\" BETWEEN ?1 AND ?2 {order_and_limit}"
            ),
            params: vec![window.start.to_string(), window.end.to_string()],
        },
        None => Statement {
            sql: format!("SELECT * FROM \"transaction\" {order_and_limit}"),
            params: Vec::new(),
        },
    }
}

/// Select up to [LISTING_ROW_LIMIT] transactions in no particular order.
pub fn build_listing_query() -> Statement {
    Statement {
        sql: format!("SELECT * FROM \"transaction\" LIMIT {LISTING_ROW_LIMIT}"),
        params: Vec::new(),
    }
}
