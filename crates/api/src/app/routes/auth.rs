use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use malvader_auth::Hs256JwtValidator;
use malvader_infra::{BankService, BankStore, services::Session};

use crate::app::{dto, errors};
use crate::app::routes::respond;
use crate::context::SessionContext;

pub async fn login<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Json(body): Json<dto::LoginRequest>,
) -> Response {
    let result = service.login(body.role, &body.national_id, &body.password).await;
    respond(result, StatusCode::OK, dto::challenge_to_json)
}

pub async fn verify_otp<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(jwt): Extension<Arc<Hs256JwtValidator>>,
    Json(body): Json<dto::VerifyOtpRequest>,
) -> Response {
    match service.verify_otp(body.principal_id, &body.code).await {
        Ok(session) => issue_token(&jwt, &session),
        Err(err) => errors::domain_error_to_response(err),
    }
}

pub async fn change_password<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(jwt): Extension<Arc<Hs256JwtValidator>>,
    Extension(session): Extension<SessionContext>,
    Json(body): Json<dto::ChangePasswordRequest>,
) -> Response {
    let result = service
        .change_password(session.actor(), &body.current_password, &body.new_password)
        .await;
    match result {
        Ok(session) => issue_token(&jwt, &session),
        Err(err) => errors::domain_error_to_response(err),
    }
}

fn issue_token(jwt: &Hs256JwtValidator, session: &Session) -> Response {
    match jwt.sign(&session.claims) {
        Ok(token) => {
            let body = dto::session_to_json(
                &token,
                &session.state(),
                session.claims.role,
                session.claims.exp,
            );
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "could not sign session token");
            errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "token_error",
                "could not issue session token",
            )
        }
    }
}
