use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use malvader_core::{AccountId, DomainError, Money};

use crate::transaction::{TransactionKind, TransactionRecord};

/// Number of lines returned when no date range is given.
pub const DEFAULT_STATEMENT_LINES: usize = 50;

/// Optional inclusive date range for a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl StatementRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self, DomainError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(DomainError::validation("start date must not be after end date"));
            }
        }
        Ok(Self { from, to })
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Inclusive start at 00:00 of `from`; exclusive end at 00:00 of the
    /// day after `to`.
    pub fn bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let start = self.from.map(|d| d.and_time(NaiveTime::MIN).and_utc());
        let end = self
            .to
            .map(|d| d.and_time(NaiveTime::MIN).and_utc() + Duration::days(1));
        (start, end)
    }

    /// Line cap: the latest 50 when unbounded, everything in range otherwise.
    pub fn limit(&self) -> Option<usize> {
        self.is_unbounded().then_some(DEFAULT_STATEMENT_LINES)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let (start, end) = self.bounds();
        start.is_none_or(|s| at >= s) && end.is_none_or(|e| at < e)
    }
}

/// One row of an account statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub occurred_at: DateTime<Utc>,
    pub kind: TransactionKind,
    pub description: String,
    /// Positive when the account received the money.
    pub signed_amount: Money,
}

impl StatementLine {
    pub fn for_account(account_id: AccountId, record: &TransactionRecord) -> Self {
        Self {
            occurred_at: record.occurred_at,
            kind: record.kind,
            description: record.description.clone(),
            signed_amount: record.signed_amount_for(account_id),
        }
    }
}

/// Filter `records` to those touching the account within `range`, newest
/// first, capped per `StatementRange::limit`.
pub fn build_statement(
    account_id: AccountId,
    records: &[TransactionRecord],
    range: &StatementRange,
) -> Vec<StatementLine> {
    let mut lines: Vec<StatementLine> = records
        .iter()
        .filter(|r| r.touches(account_id) && range.contains(r.occurred_at))
        .map(|r| StatementLine::for_account(account_id, r))
        .collect();
    lines.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
    if let Some(limit) = range.limit() {
        lines.truncate(limit);
    }
    lines
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export failed: {0}")]
    Write(String),
}

/// Renders statement lines into a downloadable document.
pub trait StatementExporter: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;

    fn export(&self, lines: &[StatementLine]) -> Result<Vec<u8>, ExportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn end_date_covers_the_whole_day() {
        let range = StatementRange::new(
            NaiveDate::from_ymd_opt(2025, 4, 1),
            NaiveDate::from_ymd_opt(2025, 4, 10),
        )
        .unwrap();
        assert!(range.contains(Utc.with_ymd_and_hms(2025, 4, 10, 23, 59, 59).unwrap()));
        let last_instant = Utc.with_ymd_and_hms(2025, 4, 10, 23, 59, 59).unwrap() + Duration::milliseconds(999);
        assert!(range.contains(last_instant));
        assert!(!range.contains(Utc.with_ymd_and_hms(2025, 4, 11, 0, 0, 0).unwrap()));
        assert!(range.contains(at(1, 0)));
        assert_eq!(range.limit(), None);
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(StatementRange::new(
            NaiveDate::from_ymd_opt(2025, 4, 10),
            NaiveDate::from_ymd_opt(2025, 4, 1)
        )
        .is_err());
    }

    #[test]
    fn unbounded_statement_keeps_latest_fifty_newest_first() {
        let mine = AccountId::new();
        let other = AccountId::new();
        let mut records: Vec<TransactionRecord> = (0..60)
            .map(|i| {
                TransactionRecord::deposit(mine, Money::from_units(1), at(1, 0) + Duration::minutes(i), "d")
            })
            .collect();
        records.push(TransactionRecord::transfer(other, mine, Money::from_units(7), at(20, 0), "in"));
        records.push(TransactionRecord::deposit(other, Money::from_units(9), at(21, 0), "not mine"));

        let lines = build_statement(mine, &records, &StatementRange::default());
        assert_eq!(lines.len(), DEFAULT_STATEMENT_LINES);
        assert_eq!(lines[0].signed_amount, Money::from_units(7));
        assert!(lines.windows(2).all(|w| w[0].occurred_at >= w[1].occurred_at));
    }
}
