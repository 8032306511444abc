use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::Value;

use malvader_core::DomainError;
use malvader_infra::BankStore;

use crate::app::errors;

pub mod auth;
pub mod customer;
pub mod staff;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router<S: BankStore>() -> Router {
    Router::new()
        .route("/auth/change-password", post(auth::change_password::<S>))
        .route("/me/summary", get(customer::summary::<S>))
        .route("/me/credit-limit", get(customer::credit_limit::<S>))
        .route("/accounts/:number/deposit", post(customer::deposit::<S>))
        .route("/accounts/:number/withdraw", post(customer::withdraw::<S>))
        .route("/accounts/:number/transfer", post(customer::transfer::<S>))
        .route("/accounts/:number/statement", get(customer::statement::<S>))
        .route("/accounts/:number/statement.csv", get(customer::statement_csv::<S>))
        .nest("/staff", staff::router::<S>())
}

/// Render `result` as `status` + JSON body, or as the mapped error.
pub(crate) fn respond<T>(
    result: Result<T, DomainError>,
    status: StatusCode,
    body: impl FnOnce(&T) -> Value,
) -> Response {
    match result {
        Ok(value) => (status, Json(body(&value))).into_response(),
        Err(err) => errors::domain_error_to_response(err),
    }
}
