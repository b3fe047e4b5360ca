//! Application router configuration and the CORS policy for the dashboard.

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::get,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::{
    AppState, endpoints, fraud_summary::get_fraud_summary_endpoint, not_found::get_404_not_found,
    transaction::{get_data_endpoint, get_transactions_endpoint},
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::TRANSACTIONS, get(get_transactions_endpoint))
        .route(endpoints::FRAUD_SUMMARY, get(get_fraud_summary_endpoint))
        .route(endpoints::DATA, get(get_data_endpoint))
        .fallback(get_404_not_found)
        .with_state(state)
}

/// An origin given on the command line is not a valid header value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{0}\" is not a valid origin")]
pub struct InvalidOrigin(pub String);

/// Which browser origins may call the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin, with any method and header. Only suitable for development.
    Any,
    /// Only these origins, and only GET requests.
    List(Vec<HeaderValue>),
}

impl AllowedOrigins {
    /// Parse a list of origins such as `http://localhost:3000`.
    ///
    /// An empty list allows any origin.
    ///
    /// # Errors
    /// Returns [InvalidOrigin] for the first origin that is not a valid header value.
    pub fn parse<S: AsRef<str>>(origins: &[S]) -> Result<Self, InvalidOrigin> {
        if origins.is_empty() {
            return Ok(Self::Any);
        }

        origins
            .iter()
            .map(|origin| {
                let origin = origin.as_ref().trim().trim_end_matches('/');
                HeaderValue::from_str(origin).map_err(|_| InvalidOrigin(origin.to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::List)
    }
}

/// Build the CORS layer for `origins`.
pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    match origins {
        AllowedOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        AllowedOrigins::List(origins) => CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins.iter().cloned()))
            .allow_methods([Method::GET])
            .allow_headers(Any),
    }
}
