//! Everything related to the transaction table.
//!
//! - [schema]: the `TransactionRecord` model, the table declaration and row validation
//! - [query]: the SQL statements behind the endpoints
//! - [mapper]: raw rows to ordered column→value mappings
//! - the `/data` and `/transaction` route handlers

mod data_endpoint;
mod list_endpoint;
pub mod mapper;
pub mod query;
pub mod schema;

pub use data_endpoint::{DataResponse, get_data_endpoint};
pub use list_endpoint::get_transactions_endpoint;
pub use schema::{TransactionRecord, create_transaction_table, insert_transaction};

#[cfg(test)]
pub(crate) use schema::test_utils::sample_record;
