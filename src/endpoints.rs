//! The API endpoints URIs.

/// The route for the raw transaction listing.
pub const TRANSACTIONS: &str = "/transaction";
/// The route for the fraud/non-fraud counts.
pub const FRAUD_SUMMARY: &str = "/fraud-summary";
/// The route for the date-range filtered transaction feed.
pub const DATA: &str = "/data";
