use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use serde_json::json;
use uuid::Uuid;

use malvader_infra::services::{OpenAccountRequest, RegisterEmployeeRequest};
use malvader_infra::{BankService, BankStore};

use crate::app::dto;
use crate::app::routes::respond;
use crate::context::SessionContext;

pub fn router<S: BankStore>() -> Router {
    Router::new()
        .route("/accounts", post(open_account::<S>))
        .route("/accounts/:number/closure", post(request_closure::<S>))
        .route("/closures/:token/confirm", post(confirm_closure::<S>))
        .route("/employees", post(register_employee::<S>))
        .route("/subordinates", get(subordinates::<S>))
}

pub async fn open_account<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
    Json(body): Json<dto::OpenAccountBody>,
) -> Response {
    let result = match body.initial_deposit.to_money() {
        Ok(initial_deposit) => {
            let request = OpenAccountRequest {
                holder: body.customer,
                kind: body.account,
                initial_deposit,
            };
            service.open_account(session.actor(), request).await
        }
        Err(err) => Err(err),
    };
    respond(result, StatusCode::CREATED, dto::opened_account_to_json)
}

pub async fn request_closure<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
    Path(number): Path<String>,
    Json(body): Json<dto::RequestClosureBody>,
) -> Response {
    let result = async {
        let number = dto::parse_account_number(&number)?;
        service.request_closure(session.actor(), &number, &body.reason).await
    }
    .await;
    respond(result, StatusCode::ACCEPTED, dto::closure_to_json)
}

pub async fn confirm_closure<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
    Path(token): Path<Uuid>,
    Json(body): Json<dto::ConfirmClosureBody>,
) -> Response {
    let result = service
        .confirm_closure(session.actor(), token, &body.password, &body.code)
        .await;
    respond(result, StatusCode::OK, |account| {
        json!({ "account": dto::account_to_json(account) })
    })
}

pub async fn register_employee<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
    Json(body): Json<dto::RegisterEmployeeBody>,
) -> Response {
    let request = RegisterEmployeeRequest {
        identity: body.identity,
        rank: body.rank,
        password: body.password,
    };
    let result = service.register_employee(session.actor(), request).await;
    respond(result, StatusCode::CREATED, dto::registered_employee_to_json)
}

pub async fn subordinates<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
) -> Response {
    let result = service.subordinates(session.actor()).await;
    respond(result, StatusCode::OK, |members| {
        json!({
            "items": members.iter().map(dto::staff_member_to_json).collect::<Vec<_>>(),
        })
    })
}
