//! Service wiring shared by `main.rs` and the black-box tests.

use std::sync::Arc;

use malvader_auth::AuthPolicy;
use malvader_core::{Clock, DomainError};
use malvader_infra::{AppConfig, BankService, BankStore, CsvStatementExporter, OtpNotifier};

/// Wire the bank service over `store` and seed the root branch and manager
/// when the configuration asks for it.
pub async fn build_service<S: BankStore>(
    store: S,
    config: &AppConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn OtpNotifier>,
) -> Result<Arc<BankService<S>>, DomainError> {
    let auth_policy = AuthPolicy {
        session_ttl_minutes: config.session_ttl_minutes,
        ..AuthPolicy::default()
    };
    let service = BankService::new(store, clock, notifier, Arc::new(CsvStatementExporter))
        .with_auth_policy(auth_policy);

    if config.seed_defaults {
        let manager = &config.seed_manager;
        if service.seed(&manager.identity(), &manager.password).await? {
            tracing::info!(national_id = %manager.national_id, "seeded central branch and root manager");
        }
    }

    Ok(Arc::new(service))
}
