//! The shape of the transaction table and validation of query results against it.

use rusqlite::{Connection, params, types::Value};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, timestamp::Timestamp};

use super::mapper::MappedRow;

// ============================================================================
// MODELS
// ============================================================================

/// The columns of the transaction table, in declaration order.
pub const COLUMNS: [&str; 15] = [
    "TransactionID",
    "Amount",
    "CustomerID",
    "Category",
    "AnomalyScore",
    "TransactionAmount",
    "AccountBalance",
    "LastLogin",
    "Name",
    "Age",
    "Address",
    "Timestamp",
    "MerchantID",
    "FraudIndicator",
    "SuspiciousFlag",
];

/// One card transaction together with the customer details and fraud labels
/// the dashboard displays.
///
/// Monetary values and scores are exact decimals and serialize to JSON as
/// strings so no precision is lost on the way to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Opaque unique identifier, the natural key of the table.
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
    /// The amount of money involved.
    #[serde(rename = "Amount", with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// The customer that made the transaction.
    #[serde(rename = "CustomerID")]
    pub customer_id: String,
    /// A category label such as "Food" or "Travel".
    #[serde(rename = "Category")]
    pub category: String,
    /// How unusual the transaction looks to the anomaly model.
    #[serde(rename = "AnomalyScore", with = "rust_decimal::serde::str")]
    pub anomaly_score: Decimal,
    /// The transaction amount as reported by the payment processor.
    #[serde(rename = "TransactionAmount", with = "rust_decimal::serde::str")]
    pub transaction_amount: Decimal,
    /// The customer's account balance.
    #[serde(rename = "AccountBalance", with = "rust_decimal::serde::str")]
    pub account_balance: Decimal,
    /// When the customer last logged in.
    #[serde(rename = "LastLogin")]
    pub last_login: Timestamp,
    /// The customer's display name.
    #[serde(rename = "Name")]
    pub name: String,
    /// The customer's age in years.
    #[serde(rename = "Age")]
    pub age: i64,
    /// The customer's postal address.
    #[serde(rename = "Address")]
    pub address: String,
    /// When the transaction happened.
    #[serde(rename = "Timestamp")]
    pub timestamp: Timestamp,
    /// The merchant that received the payment.
    #[serde(rename = "MerchantID")]
    pub merchant_id: String,
    /// Whether the transaction is confirmed fraudulent.
    #[serde(rename = "FraudIndicator", deserialize_with = "deserialize_flag")]
    pub fraud_indicator: bool,
    /// Whether the transaction has been flagged for review.
    #[serde(rename = "SuspiciousFlag", deserialize_with = "deserialize_flag")]
    pub suspicious_flag: bool,
}

impl TransactionRecord {
    /// Validate a mapped result row against the schema, field by field.
    ///
    /// Extra columns are ignored.
    ///
    /// # Errors
    /// Returns [Error::MissingColumn] as soon as a schema column is absent from
    /// `row`, or [Error::InvalidColumnValue] if a value does not fit its column type.
    pub fn from_mapped_row(row: &MappedRow) -> Result<Self, Error> {
        Ok(Self {
            transaction_id: text(row, "TransactionID")?,
            amount: decimal(row, "Amount")?,
            customer_id: text(row, "CustomerID")?,
            category: text(row, "Category")?,
            anomaly_score: decimal(row, "AnomalyScore")?,
            transaction_amount: decimal(row, "TransactionAmount")?,
            account_balance: decimal(row, "AccountBalance")?,
            last_login: timestamp(row, "LastLogin")?,
            name: text(row, "Name")?,
            age: integer(row, "Age")?,
            address: text(row, "Address")?,
            timestamp: timestamp(row, "Timestamp")?,
            merchant_id: text(row, "MerchantID")?,
            fraud_indicator: flag(row, "FraudIndicator")?,
            suspicious_flag: flag(row, "SuspiciousFlag")?,
        })
    }
}

fn column<'a>(row: &'a MappedRow, column: &'static str) -> Result<&'a Value, Error> {
    row.get(column).ok_or(Error::MissingColumn(column))
}

fn invalid(column: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidColumnValue {
        column,
        reason: reason.into(),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Integer(_) => "an integer",
        Value::Real(_) => "a real number",
        Value::Text(_) => "text",
        Value::Blob(_) => "a blob",
    }
}

fn text(row: &MappedRow, name: &'static str) -> Result<String, Error> {
    match column(row, name)? {
        Value::Text(text) => Ok(text.clone()),
        other => Err(invalid(name, format!("expected text, got {}", describe(other)))),
    }
}

fn decimal(row: &MappedRow, name: &'static str) -> Result<Decimal, Error> {
    match column(row, name)? {
        Value::Text(text) => text
            .trim()
            .parse::<Decimal>()
            .map_err(|error| invalid(name, format!("\"{text}\" is not a decimal: {error}"))),
        Value::Integer(integer) => Ok(Decimal::from(*integer)),
        // Real values would already have lost precision, refuse rather than pass them on.
        other => Err(invalid(name, format!("expected a decimal, got {}", describe(other)))),
    }
}

fn integer(row: &MappedRow, name: &'static str) -> Result<i64, Error> {
    match column(row, name)? {
        Value::Integer(integer) => Ok(*integer),
        other => Err(invalid(name, format!("expected an integer, got {}", describe(other)))),
    }
}

fn timestamp(row: &MappedRow, name: &'static str) -> Result<Timestamp, Error> {
    match column(row, name)? {
        Value::Text(text) => Timestamp::parse(text).map_err(|error| invalid(name, error.to_string())),
        other => Err(invalid(name, format!("expected a timestamp, got {}", describe(other)))),
    }
}

fn flag(row: &MappedRow, name: &'static str) -> Result<bool, Error> {
    match column(row, name)? {
        Value::Integer(0) => Ok(false),
        Value::Integer(1) => Ok(true),
        Value::Integer(other) => Err(invalid(name, format!("expected 0 or 1, got {other}"))),
        other => Err(invalid(name, format!("expected 0 or 1, got {}", describe(other)))),
    }
}

/// Accept `true`/`false`, `0`/`1`, or their text forms, as found in CSV exports.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Integer(i64),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Integer(0) => Ok(false),
        Flag::Integer(1) => Ok(true),
        Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            _ => Err(serde::de::Error::custom(format!(
                "\"{text}\" is not a boolean flag"
            ))),
        },
        Flag::Integer(other) => Err(serde::de::Error::custom(format!(
            "{other} is not a boolean flag"
        ))),
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the transaction table in the database.
///
/// Decimal columns are declared as TEXT so SQLite never converts them to
/// floating point.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                \"TransactionID\" TEXT PRIMARY KEY NOT NULL,
                \"Amount\" TEXT NOT NULL,
                \"CustomerID\" TEXT NOT NULL,
                \"Category\" TEXT NOT NULL,
                \"AnomalyScore\" TEXT NOT NULL,
                \"TransactionAmount\" TEXT NOT NULL,
                \"AccountBalance\" TEXT NOT NULL,
                \"LastLogin\" TEXT NOT NULL,
                \"Name\" TEXT NOT NULL,
                \"Age\" INTEGER NOT NULL,
                \"Address\" TEXT NOT NULL,
                \"Timestamp\" TEXT NOT NULL,
                \"MerchantID\" TEXT NOT NULL,
                \"FraudIndicator\" INTEGER NOT NULL CHECK (\"FraudIndicator\" IN (0, 1)),
                \"SuspiciousFlag\" INTEGER NOT NULL CHECK (\"SuspiciousFlag\" IN (0, 1))
                );
        CREATE INDEX IF NOT EXISTS idx_transaction_timestamp ON \"transaction\"(\"Timestamp\");",
    )
}

/// Insert `record` into the transaction table.
///
/// # Errors
/// Returns [Error::SqlError] if the insert fails, e.g. the transaction ID already exists.
pub fn insert_transaction(record: &TransactionRecord, connection: &Connection) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO \"transaction\" (
            \"TransactionID\", \"Amount\", \"CustomerID\", \"Category\", \"AnomalyScore\",
            \"TransactionAmount\", \"AccountBalance\", \"LastLogin\", \"Name\", \"Age\",
            \"Address\", \"Timestamp\", \"MerchantID\", \"FraudIndicator\", \"SuspiciousFlag\")
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            record.transaction_id,
            record.amount.to_string(),
            record.customer_id,
            record.category,
            record.anomaly_score.to_string(),
            record.transaction_amount.to_string(),
            record.account_balance.to_string(),
            record.last_login,
            record.name,
            record.age,
            record.address,
            record.timestamp,
            record.merchant_id,
            record.fraud_indicator,
            record.suspicious_flag,
        ],
    )?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use rusqlite::{Connection, types::Value};
    use rust_decimal::Decimal;

    use crate::{
        Error,
        db::execute_query,
        transaction::mapper::{MappedRow, map_rows},
    };

    use super::{
        COLUMNS, TransactionRecord, create_transaction_table, insert_transaction,
        test_utils::sample_record,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_transaction_table(&conn).unwrap();
        conn
    }

    fn select_all(conn: &Connection) -> Vec<MappedRow> {
        let result = execute_query(conn, "SELECT * FROM \"transaction\"", &[]).unwrap();
        map_rows(&result.columns, result.rows).unwrap()
    }

    #[test]
    fn table_columns_match_schema() {
        let conn = get_test_connection();

        let result = execute_query(&conn, "SELECT * FROM \"transaction\"", &[]).unwrap();

        assert_eq!(result.columns, COLUMNS);
    }

    #[test]
    fn inserted_record_validates_back() {
        let conn = get_test_connection();
        let want = sample_record("T1", "2024-06-01T00:00");
        insert_transaction(&want, &conn).unwrap();

        let rows = select_all(&conn);
        let got = TransactionRecord::from_mapped_row(&rows[0]).unwrap();

        assert_eq!(got, want);
    }

    #[test]
    fn decimals_are_stored_as_exact_text() {
        let conn = get_test_connection();
        let mut record = sample_record("T1", "2024-06-01T00:00");
        record.amount = "0.10".parse().unwrap();
        insert_transaction(&record, &conn).unwrap();

        let rows = select_all(&conn);

        assert_eq!(rows[0].get("Amount"), Some(&Value::Text("0.10".to_owned())));
        assert_eq!(
            TransactionRecord::from_mapped_row(&rows[0]).unwrap().amount,
            Decimal::new(10, 2)
        );
    }

    #[test]
    fn duplicate_transaction_id_is_rejected() {
        let conn = get_test_connection();
        insert_transaction(&sample_record("T1", "2024-06-01T00:00"), &conn).unwrap();

        let got = insert_transaction(&sample_record("T1", "2024-07-01T00:00"), &conn);

        assert!(matches!(got, Err(Error::SqlError(_))));
    }

    #[test]
    fn missing_column_fails_fast() {
        let conn = get_test_connection();
        insert_transaction(&sample_record("T1", "2024-06-01T00:00"), &conn).unwrap();
        let result = execute_query(
            &conn,
            "SELECT \"TransactionID\", \"Amount\" FROM \"transaction\"",
            &[],
        )
        .unwrap();
        let rows = map_rows(&result.columns, result.rows).unwrap();

        let got = TransactionRecord::from_mapped_row(&rows[0]);

        assert_eq!(got, Err(Error::MissingColumn("CustomerID")));
    }

    #[test]
    fn out_of_range_flag_is_invalid() {
        let mut values: Vec<Value> = COLUMNS
            .iter()
            .map(|_| Value::Text("x".to_owned()))
            .collect();
        values[0] = Value::Text("T1".to_owned());
        for index in [1, 4, 5, 6] {
            values[index] = Value::Text("1.5".to_owned());
        }
        values[7] = Value::Text("2024-01-01T00:00".to_owned());
        values[9] = Value::Integer(30);
        values[11] = Value::Text("2024-01-01T00:00".to_owned());
        values[13] = Value::Integer(2);
        values[14] = Value::Integer(0);
        let columns: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
        let rows = map_rows(&columns, vec![values]).unwrap();

        let got = TransactionRecord::from_mapped_row(&rows[0]);

        assert!(matches!(
            got,
            Err(Error::InvalidColumnValue {
                column: "FraudIndicator",
                ..
            })
        ));
    }

    #[test]
    fn serializes_with_column_names() {
        let mut record = sample_record("T1", "2024-06-01T00:00");
        record.fraud_indicator = true;

        let got = serde_json::to_value(&record).unwrap();

        assert_eq!(got["TransactionID"], "T1");
        assert_eq!(got["Amount"], "55.99");
        assert_eq!(got["AnomalyScore"], "0.1234");
        assert_eq!(got["Age"], 42);
        assert_eq!(got["Timestamp"], "2024-06-01T00:00:00.000000");
        assert_eq!(got["FraudIndicator"], true);
        assert_eq!(got["SuspiciousFlag"], false);
        assert_eq!(got.as_object().unwrap().len(), COLUMNS.len());
    }

    #[test]
    fn deserializes_csv_style_flags() {
        let data = "TransactionID,Amount,CustomerID,Category,AnomalyScore,TransactionAmount,\
            AccountBalance,LastLogin,Name,Age,Address,Timestamp,MerchantID,FraudIndicator,SuspiciousFlag\n\
            T9,12.50,C1,Travel,0.9,12.50,100.00,2024-01-01 10:00:00,Ann,31,Somewhere,2024-01-02 11:30:00,M1,1,false\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());

        let got: TransactionRecord = reader.deserialize().next().unwrap().unwrap();

        assert_eq!(got.transaction_id, "T9");
        assert_eq!(got.amount.to_string(), "12.50");
        assert!(got.fraud_indicator);
        assert!(!got.suspicious_flag);
        assert_eq!(got.timestamp.to_string(), "2024-01-02T11:30:00.000000");
    }
}
