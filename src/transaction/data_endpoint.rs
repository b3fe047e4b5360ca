//! The date-range filtered transaction feed used by the dashboard.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Serialize;

use crate::{AppState, Error, db::execute_query};

use super::{
    mapper::map_rows,
    query::{QueryWindow, build_data_query},
    schema::TransactionRecord,
};

/// The envelope around the records returned by [get_data_endpoint].
#[derive(Debug, Serialize)]
pub struct DataResponse {
    /// The matching transactions, oldest first.
    pub data: Vec<TransactionRecord>,
}

/// A route handler for the transactions between the optional `start` and `end`
/// query parameters.
///
/// Both bounds are inclusive. The filter needs both bounds: if only one is
/// given it is ignored without being parsed, so `?start=garbage` on its own
/// returns the unfiltered feed rather than an error.
///
/// # Errors
/// Responds with 400 if both bounds are given and either cannot be parsed or
/// falls outside the supported range of years, and with a 5xx status if the
/// database cannot be read.
pub async fn get_data_endpoint(
    State(state): State<AppState>,
    Query(window): Query<QueryWindow>,
) -> Result<Json<DataResponse>, Error> {
    let time_window = window.validate()?;
    let statement = build_data_query(time_window.as_ref());

    let data = state
        .query(move |connection| {
            let result = execute_query(connection, &statement.sql, &statement.params)?;

            map_rows(&result.columns, result.rows)?
                .iter()
                .map(TransactionRecord::from_mapped_row)
                .collect::<Result<Vec<_>, _>>()
        })
        .await?;

    tracing::debug!("returning {} transactions for {time_window:?}", data.len());

    Ok(Json(DataResponse { data }))
}
