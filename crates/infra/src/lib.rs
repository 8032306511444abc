//! Infrastructure layer: storage, configuration, delivery adapters and the
//! application services that tie the pure domain crates to them.

pub mod config;
pub mod export;
pub mod notify;
pub mod services;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{AppConfig, ConfigError, SeedManager};
pub use export::CsvStatementExporter;
pub use notify::{LogNotifier, NotifyError, OtpNotifier, RecordingNotifier};
pub use services::BankService;
pub use store::{BankStore, InMemoryBankStore, PostgresBankStore, StoreError, UnitOfWork};
