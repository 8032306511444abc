//! Read-side views: statements, export, dashboard and credit projection.

use tracing::instrument;

use malvader_accounts::{
    Account, AccountNumber, CreditProjection, StatementLine, StatementRange, build_statement,
};
use malvader_auth::{Actor, ensure_owner};
use malvader_core::{CustomerId, DomainError};

use super::{BankService, finish};
use crate::store::{BankStore, TransactionQuery, UnitOfWork};

/// Lines shown on the dashboard.
pub const DASHBOARD_RECENT_LINES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDocument {
    pub content_type: &'static str,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub customer_name: String,
    /// The customer's oldest account, if any.
    pub account: Option<Account>,
    pub recent: Vec<StatementLine>,
}

impl<S: BankStore> BankService<S> {
    #[instrument(skip_all, fields(account = %number))]
    pub async fn statement(
        &self,
        actor: &Actor,
        number: &AccountNumber,
        range: StatementRange,
    ) -> Result<Vec<StatementLine>, DomainError> {
        let mut tx = self.begin().await?;
        let result = async {
            let account = tx
                .account_by_number(number)
                .await?
                .ok_or(DomainError::not_found("account"))?;
            ensure_owner(actor, account.customer_id)?;

            let (from, to) = range.bounds();
            let query = TransactionQuery {
                from,
                to,
                limit: range.limit(),
            };
            let records = tx.transactions_for(account.id, query).await?;
            Ok::<_, DomainError>(build_statement(account.id, &records, &range))
        }
        .await;
        finish(tx, "statement", result).await
    }

    pub async fn export_statement(
        &self,
        actor: &Actor,
        number: &AccountNumber,
        range: StatementRange,
    ) -> Result<StatementDocument, DomainError> {
        let lines = self.statement(actor, number, range).await?;
        let bytes = self
            .exporter
            .export(&lines)
            .map_err(|e| DomainError::consistency(e.to_string()))?;
        Ok(StatementDocument {
            content_type: self.exporter.content_type(),
            file_name: format!("statement-{}.{}", number, self.exporter.file_extension()),
            bytes,
        })
    }

    #[instrument(skip_all, fields(principal_id = %actor.principal_id))]
    pub async fn dashboard(&self, actor: &Actor) -> Result<Dashboard, DomainError> {
        let customer_id = acting_customer(actor)?;
        let mut tx = self.begin().await?;
        let result = async {
            let principal = tx
                .principal(actor.principal_id)
                .await?
                .ok_or(DomainError::not_found("customer"))?;
            let account = tx.accounts_of_customer(customer_id).await?.into_iter().next();
            let recent = match &account {
                Some(account) => {
                    let query = TransactionQuery {
                        limit: Some(DASHBOARD_RECENT_LINES),
                        ..TransactionQuery::default()
                    };
                    let records = tx.transactions_for(account.id, query).await?;
                    records
                        .iter()
                        .map(|r| StatementLine::for_account(account.id, r))
                        .collect()
                }
                None => Vec::new(),
            };
            Ok::<_, DomainError>(Dashboard {
                customer_name: principal.name,
                account,
                recent,
            })
        }
        .await;
        finish(tx, "dashboard", result).await
    }

    pub async fn credit_limit(&self, actor: &Actor) -> Result<CreditProjection, DomainError> {
        let customer_id = acting_customer(actor)?;
        let mut tx = self.begin().await?;
        let result = async {
            let customer = tx
                .customer(customer_id)
                .await?
                .ok_or(DomainError::not_found("customer"))?;
            Ok::<_, DomainError>(CreditProjection::from_score(customer.credit_score))
        }
        .await;
        finish(tx, "credit_limit", result).await
    }
}

fn acting_customer(actor: &Actor) -> Result<CustomerId, DomainError> {
    actor
        .customer_id
        .ok_or_else(|| DomainError::permission_denied("customer session required"))
}
