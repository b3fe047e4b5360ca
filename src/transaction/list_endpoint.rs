//! The raw transaction listing.

use axum::{Json, extract::State};

use crate::{AppState, Error, db::execute_query};

use super::{mapper::map_rows, query::build_listing_query, schema::TransactionRecord};

/// A route handler returning up to 100 transactions in no particular order.
pub async fn get_transactions_endpoint(
    State(state): State<AppState>,
) -> Result<Json<Vec<TransactionRecord>>, Error> {
    let statement = build_listing_query();

    let transactions = state
        .query(move |connection| {
            let result = execute_query(connection, &statement.sql, &statement.params)?;

            map_rows(&result.columns, result.rows)?
                .iter()
                .map(TransactionRecord::from_mapped_row)
                .collect::<Result<Vec<_>, _>>()
        })
        .await?;

    Ok(Json(transactions))
}
