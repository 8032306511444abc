use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use malvader_auth::JwtValidator;
use malvader_core::Clock;

use crate::app::errors::json_error;
use crate::context::SessionContext;

/// The only protected path open to a session holding a provisional password.
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub clock: Arc<dyn Clock>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map_err(unauthorized)?;

    let claims = state
        .jwt
        .validate(token, state.clock.now())
        .map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            unauthorized(StatusCode::UNAUTHORIZED)
        })?;
    let actor = claims.actor().map_err(|_| unauthorized(StatusCode::UNAUTHORIZED))?;
    let session = SessionContext::from_claims(actor, &claims);

    if session.password_change_required() && req.uri().path() != CHANGE_PASSWORD_PATH {
        return Err(json_error(
            StatusCode::FORBIDDEN,
            "password_change_required",
            "change the provisional password before continuing",
        ));
    }

    req.extensions_mut().insert(session);

    Ok(next.run(req).await)
}

fn unauthorized(status: StatusCode) -> Response {
    json_error(status, "unauthorized", "missing or invalid bearer token")
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header::AUTHORIZATION};

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer(&headers), Ok("abc.def.ghi"));
    }

    #[test]
    fn missing_or_malformed_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));
    }
}
