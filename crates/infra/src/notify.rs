//! One-time code delivery.
//!
//! The bank only needs "send this code to this person" and a yes/no answer.
//! `LogNotifier` records each delivery in the log and only includes the code
//! itself when explicitly asked to (local development). `RecordingNotifier`
//! keeps every message in memory so tests can read the code back.

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use malvader_core::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("delivery rejected: {0}")]
    Rejected(String),

    #[error("delivery channel unavailable: {0}")]
    Unavailable(String),
}

impl From<NotifyError> for DomainError {
    fn from(value: NotifyError) -> Self {
        DomainError::NotificationFailed(value.to_string())
    }
}

#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn send(&self, email: &str, name: &str, code: &str) -> Result<(), NotifyError>;
}

const REDACTED: &str = "[redacted]";

/// Reports deliveries through `tracing`. Codes are redacted unless
/// `reveal_codes` is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier {
    reveal_codes: bool,
}

impl LogNotifier {
    pub fn new(reveal_codes: bool) -> Self {
        Self { reveal_codes }
    }

    fn shown<'a>(&self, code: &'a str) -> &'a str {
        if self.reveal_codes { code } else { REDACTED }
    }
}

#[async_trait]
impl OtpNotifier for LogNotifier {
    async fn send(&self, email: &str, name: &str, code: &str) -> Result<(), NotifyError> {
        tracing::info!(recipient = %email, name = %name, code = %self.shown(code), "one-time code issued");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub email: String,
    pub name: String,
    pub code: String,
}

/// In-memory notifier that records every delivery.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentCode>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent code delivered to `email`.
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        let sent = self.sent.lock().ok()?;
        sent.iter()
            .rev()
            .find(|s| s.email.eq_ignore_ascii_case(email))
            .map(|s| s.code.clone())
    }
}

#[async_trait]
impl OtpNotifier for RecordingNotifier {
    async fn send(&self, email: &str, name: &str, code: &str) -> Result<(), NotifyError> {
        let failing = self.failing.lock().map(|f| *f).unwrap_or(false);
        if failing {
            return Err(NotifyError::Unavailable("mail relay offline".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentCode {
                email: email.to_string(),
                name: name.to_string(),
                code: code.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_notifier_returns_latest_code() {
        let notifier = RecordingNotifier::new();
        notifier.send("ana@bank.test", "Ana", "111111").await.unwrap();
        notifier.send("bia@bank.test", "Bia", "222222").await.unwrap();
        notifier.send("ANA@bank.test", "Ana", "333333").await.unwrap();

        assert_eq!(notifier.last_code_for("ana@bank.test").as_deref(), Some("333333"));
        assert_eq!(notifier.sent().len(), 3);
    }

    #[test]
    fn log_notifier_redacts_codes_by_default() {
        assert_eq!(LogNotifier::default().shown("123456"), "[redacted]");
        assert_eq!(LogNotifier::new(false).shown("123456"), "[redacted]");
        assert_eq!(LogNotifier::new(true).shown("123456"), "123456");
    }

    #[tokio::test]
    async fn failing_notifier_maps_to_notification_failed() {
        let notifier = RecordingNotifier::new();
        notifier.set_failing(true);

        let err = notifier.send("ana@bank.test", "Ana", "111111").await.unwrap_err();
        assert!(matches!(DomainError::from(err), DomainError::NotificationFailed(_)));
        assert!(notifier.sent().is_empty());
    }
}
