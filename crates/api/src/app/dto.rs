use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use malvader_accounts::{
    Account, AccountKind, AccountNumber, CreditProjection, RequestKey, StatementLine, StatementRange,
};
use malvader_auth::{EmployeeRank, IdentityInput, LoginState, Role};
use malvader_core::{DomainError, Money, PrincipalId};
use malvader_infra::services::{
    AccountHolder, ClosureChallenge, Dashboard, LoginChallenge, OpenedAccount, Receipt,
    RegisteredEmployee, StaffMember,
};

// -------------------------
// Request DTOs
// -------------------------

/// Amount as typed by the client: a JSON number or a string that may use
/// `,` as the decimal separator.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    pub fn to_money(&self) -> Result<Money, DomainError> {
        let money = match self {
            AmountInput::Text(text) => Money::parse(text)?,
            AmountInput::Number(number) => Money::parse(&number.to_string())?,
        };
        Ok(money)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub role: Role,
    pub national_id: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub principal_id: PrincipalId,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(flatten)]
    pub identity: IdentityInput,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: AmountInput,
    #[serde(default)]
    pub request_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub destination: String,
    pub amount: AmountInput,
    #[serde(default)]
    pub request_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatementQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl StatementQuery {
    pub fn range(&self) -> Result<StatementRange, DomainError> {
        StatementRange::new(self.from, self.to)
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountBody {
    pub customer: AccountHolder,
    pub account: AccountKind,
    pub initial_deposit: AmountInput,
}

#[derive(Debug, Deserialize)]
pub struct RequestClosureBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmClosureBody {
    pub password: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterEmployeeBody {
    #[serde(flatten)]
    pub identity: IdentityInput,
    pub rank: EmployeeRank,
    #[serde(default)]
    pub password: Option<String>,
}

pub fn parse_account_number(raw: &str) -> Result<AccountNumber, DomainError> {
    raw.parse()
}

pub fn parse_request_key(raw: Option<&str>) -> Result<Option<RequestKey>, DomainError> {
    raw.map(RequestKey::new).transpose()
}

// -------------------------
// Response mapping
// -------------------------

pub fn account_to_json(account: &Account) -> Value {
    json!({
        "number": account.number.as_str(),
        "type": account.account_type().as_str(),
        "status": account.status.as_str(),
        "balance": account.balance,
        "available": account.available_funds(),
        "terms": account.kind,
        "opened_at": account.opened_at,
    })
}

pub fn receipt_to_json(receipt: &Receipt) -> Value {
    json!({
        "account": account_to_json(&receipt.account),
        "fee": receipt.fee.applies.then_some(receipt.fee.amount),
        "transactions": receipt
            .records
            .iter()
            .map(|r| json!({
                "id": r.id,
                "kind": r.kind.as_str(),
                "amount": r.amount,
                "description": r.description,
                "occurred_at": r.occurred_at,
            }))
            .collect::<Vec<_>>(),
    })
}

pub fn statement_to_json(number: &AccountNumber, lines: &[StatementLine]) -> Value {
    json!({
        "account": number.as_str(),
        "lines": lines
            .iter()
            .map(|l| json!({
                "occurred_at": l.occurred_at,
                "kind": l.kind.as_str(),
                "description": l.description,
                "amount": l.signed_amount,
            }))
            .collect::<Vec<_>>(),
    })
}

pub fn dashboard_to_json(dashboard: &Dashboard) -> Value {
    json!({
        "customer_name": dashboard.customer_name,
        "account": dashboard.account.as_ref().map(account_to_json),
        "recent": dashboard
            .recent
            .iter()
            .map(|l| json!({
                "occurred_at": l.occurred_at,
                "kind": l.kind.as_str(),
                "description": l.description,
                "amount": l.signed_amount,
            }))
            .collect::<Vec<_>>(),
    })
}

pub fn credit_to_json(projection: &CreditProjection) -> Value {
    json!({
        "score": projection.score,
        "current_limit": projection.current_limit,
        "projected_limit": projection.projected_limit,
    })
}

/// Serialized `LoginState` carries the `state` tag (`otp_pending`).
pub fn challenge_to_json(challenge: &LoginChallenge) -> Value {
    json!(challenge.state())
}

pub fn session_to_json(token: &str, state: &LoginState, role: Role, expires_at: i64) -> Value {
    json!({
        "token": token,
        "token_type": "Bearer",
        "role": role.as_str(),
        "expires_at": expires_at,
        "login": state,
    })
}

pub fn opened_account_to_json(opened: &OpenedAccount) -> Value {
    json!({
        "account": account_to_json(&opened.account),
        "customer_id": opened.customer.id,
        "issued_password": opened.issued_password,
    })
}

pub fn closure_to_json(challenge: &ClosureChallenge) -> Value {
    json!({
        "token": challenge.token,
        "expires_at": challenge.expires_at,
    })
}

pub fn registered_employee_to_json(registered: &RegisteredEmployee) -> Value {
    let employee = &registered.employee;
    json!({
        "employee_id": employee.id,
        "code": employee.code.as_str(),
        "rank": employee.rank.as_str(),
        "supervisor_id": employee.supervisor_id,
        "issued_password": registered.issued_password,
    })
}

pub fn staff_member_to_json(member: &StaffMember) -> Value {
    json!({
        "employee_id": member.employee.id,
        "code": member.employee.code.as_str(),
        "rank": member.employee.rank.as_str(),
        "name": member.name,
        "email": member.email,
    })
}
