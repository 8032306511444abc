//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: builds the bank service from configuration and seeds it
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use malvader_auth::Hs256JwtValidator;
use malvader_core::Clock;
use malvader_infra::{BankService, BankStore};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router around an already wired service.
///
/// `clock` is the same time source the service uses, so token expiry and
/// ledger windows agree.
pub fn build_app<S: BankStore>(
    service: Arc<BankService<S>>,
    jwt: Arc<Hs256JwtValidator>,
    clock: Arc<dyn Clock>,
) -> Router {
    let auth_state = middleware::AuthState {
        jwt: jwt.clone(),
        clock,
    };

    // Protected routes: require a verified session.
    let protected = routes::router::<S>()
        .layer(Extension(service.clone()))
        .layer(Extension(jwt.clone()))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    let public = Router::new()
        .route("/auth/login", post(routes::auth::login::<S>))
        .route("/auth/verify-otp", post(routes::auth::verify_otp::<S>))
        .route("/customers/signup", post(routes::customer::signup::<S>))
        .layer(Extension(service))
        .layer(Extension(jwt));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(public)
        .merge(protected)
        .layer(ServiceBuilder::new())
}
