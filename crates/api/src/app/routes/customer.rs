use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use malvader_infra::{BankService, BankStore};

use crate::app::routes::respond;
use crate::app::{dto, errors};
use crate::context::SessionContext;

pub async fn signup<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Json(body): Json<dto::SignupRequest>,
) -> Response {
    let result = service.signup(&body.identity, &body.password).await;
    respond(result, StatusCode::CREATED, |customer| {
        json!({ "customer_id": customer.id })
    })
}

pub async fn summary<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
) -> Response {
    let result = service.dashboard(session.actor()).await;
    respond(result, StatusCode::OK, dto::dashboard_to_json)
}

pub async fn credit_limit<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
) -> Response {
    let result = service.credit_limit(session.actor()).await;
    respond(result, StatusCode::OK, dto::credit_to_json)
}

pub async fn deposit<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
    Path(number): Path<String>,
    Json(body): Json<dto::AmountRequest>,
) -> Response {
    let result = async {
        let number = dto::parse_account_number(&number)?;
        let amount = body.amount.to_money()?;
        let key = dto::parse_request_key(body.request_key.as_deref())?;
        service.deposit(session.actor(), &number, amount, key.as_ref()).await
    }
    .await;
    respond(result, StatusCode::OK, dto::receipt_to_json)
}

pub async fn withdraw<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
    Path(number): Path<String>,
    Json(body): Json<dto::AmountRequest>,
) -> Response {
    let result = async {
        let number = dto::parse_account_number(&number)?;
        let amount = body.amount.to_money()?;
        let key = dto::parse_request_key(body.request_key.as_deref())?;
        service.withdraw(session.actor(), &number, amount, key.as_ref()).await
    }
    .await;
    respond(result, StatusCode::OK, dto::receipt_to_json)
}

pub async fn transfer<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
    Path(number): Path<String>,
    Json(body): Json<dto::TransferRequest>,
) -> Response {
    let result = async {
        let source = dto::parse_account_number(&number)?;
        let destination = dto::parse_account_number(&body.destination)?;
        let amount = body.amount.to_money()?;
        let key = dto::parse_request_key(body.request_key.as_deref())?;
        service
            .transfer(session.actor(), &source, &destination, amount, key.as_ref())
            .await
    }
    .await;
    respond(result, StatusCode::OK, dto::receipt_to_json)
}

pub async fn statement<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
    Path(number): Path<String>,
    Query(query): Query<dto::StatementQuery>,
) -> Response {
    let number = match dto::parse_account_number(&number) {
        Ok(number) => number,
        Err(err) => return errors::domain_error_to_response(err),
    };
    let result = async {
        let range = query.range()?;
        service.statement(session.actor(), &number, range).await
    }
    .await;
    respond(result, StatusCode::OK, |lines| dto::statement_to_json(&number, lines))
}

pub async fn statement_csv<S: BankStore>(
    Extension(service): Extension<Arc<BankService<S>>>,
    Extension(session): Extension<SessionContext>,
    Path(number): Path<String>,
    Query(query): Query<dto::StatementQuery>,
) -> Response {
    let result = async {
        let number = dto::parse_account_number(&number)?;
        let range = query.range()?;
        service.export_statement(session.actor(), &number, range).await
    }
    .await;
    match result {
        Ok(document) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, document.content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", document.file_name),
                ),
            ],
            document.bytes,
        )
            .into_response(),
        Err(err) => errors::domain_error_to_response(err),
    }
}
