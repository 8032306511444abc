use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use malvader_core::{DomainError, ErrorKind};

/// Map a service error onto a status code and the uniform error body.
///
/// Consistency failures carry operator detail; only the generic message
/// leaves the process.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match (&err, err.kind()) {
        (DomainError::DuplicateRequest, _) => StatusCode::CONFLICT,
        (DomainError::AccountLocked { .. }, _) => StatusCode::LOCKED,
        (_, ErrorKind::Validation) => StatusCode::BAD_REQUEST,
        (_, ErrorKind::PolicyViolation) => StatusCode::UNPROCESSABLE_ENTITY,
        (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        (_, ErrorKind::PermissionDenied) => StatusCode::FORBIDDEN,
        (_, ErrorKind::Authentication) => StatusCode::UNAUTHORIZED,
        (_, ErrorKind::NotificationFailed) => StatusCode::BAD_GATEWAY,
        (_, ErrorKind::Consistency) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.kind().as_str(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
