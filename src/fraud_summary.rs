//! The fraud/non-fraud count shown in the dashboard's pie chart.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::{AppState, Error, transaction::query::FRAUD_SUMMARY_QUERY};

/// How many transactions are confirmed fraud and how many are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudSummary {
    /// Rows with the fraud indicator set.
    pub fraudulent: i64,
    /// All other rows.
    pub non_fraudulent: i64,
}

/// A route handler for the fraud summary.
pub async fn get_fraud_summary_endpoint(
    State(state): State<AppState>,
) -> Result<Json<FraudSummary>, Error> {
    let summary = state
        .query(|connection| {
            let summary = connection.query_row(FRAUD_SUMMARY_QUERY, [], |row| {
                Ok(FraudSummary {
                    fraudulent: row.get(0)?,
                    non_fraudulent: row.get(1)?,
                })
            })?;

            Ok(summary)
        })
        .await?;

    Ok(Json(summary))
}
