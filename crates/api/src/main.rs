use std::sync::Arc;

use anyhow::Context;

use malvader_api::app::{build_app, services::build_service};
use malvader_auth::Hs256JwtValidator;
use malvader_core::{Clock, SystemClock};
use malvader_infra::{AppConfig, BankStore, InMemoryBankStore, LogNotifier, PostgresBankStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    malvader_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    if config.jwt_secret_is_default {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresBankStore::connect(&url, config.database_max_connections)
                .await
                .context("failed to connect to postgres")?;
            serve(store, &config).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            serve(InMemoryBankStore::new(), &config).await
        }
    }
}

async fn serve<S: BankStore>(store: S, config: &AppConfig) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    if config.otp_log_codes {
        tracing::warn!("OTP_LOG_CODES is on; one-time codes will appear in the log");
    }
    let notifier = Arc::new(LogNotifier::new(config.otp_log_codes));
    let service = build_service(store, config, clock.clone(), notifier)
        .await
        .context("failed to initialise the bank service")?;
    let jwt = Arc::new(Hs256JwtValidator::new(config.jwt_secret.clone().into_bytes()));
    let app = build_app(service, jwt, clock);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
