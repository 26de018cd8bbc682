//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use fulfillment::FulfillmentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Error raised by the fulfillment engine or catalog.
    Fulfillment(FulfillmentError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Fulfillment(err) => {
                let (status, kind) = fulfillment_status(err);
                (status, kind, err.to_string())
            }
        }
    }

    /// Kind of the condition that first blocked the request. Differs from
    /// the response kind only when a rollback failed after it.
    fn cause_kind(&self) -> Option<&'static str> {
        match self {
            ApiError::Fulfillment(err) => Some(fulfillment_status(err.root_cause()).1),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();

        metrics::counter!("api_errors_total", "kind" => kind).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %message, kind, "request failed");
        }

        let mut body = serde_json::json!({ "error": message, "kind": kind });
        if let Some(cause_kind) = self.cause_kind() {
            body["cause_kind"] = cause_kind.into();
        }
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_status(err: &FulfillmentError) -> (StatusCode, &'static str) {
    match err {
        FulfillmentError::Invalid(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        FulfillmentError::ItemNotFound { .. } => (StatusCode::NOT_FOUND, "item_not_found"),
        FulfillmentError::InsufficientStock { .. } => (StatusCode::CONFLICT, "insufficient_stock"),
        FulfillmentError::ReplicaDivergence { .. } => (StatusCode::CONFLICT, "replica_divergence"),
        FulfillmentError::StoreUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
        }
        FulfillmentError::PartialReservationFailure { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "partial_reservation_failure")
        }
        FulfillmentError::OrderPersistFailure { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "order_persist_failure")
        }
        // Stock may now be wrong on one replica; needs an operator.
        FulfillmentError::RollbackFailed { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "rollback_failed")
        }
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Fulfillment(FulfillmentError::Invalid(err))
    }
}
