//! CSV statement export.

use malvader_accounts::{ExportError, StatementExporter, StatementLine};

/// Timestamp layout used in exported statements.
pub const STATEMENT_DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvStatementExporter;

impl StatementExporter for CsvStatementExporter {
    fn content_type(&self) -> &'static str {
        "text/csv; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }

    fn export(&self, lines: &[StatementLine]) -> Result<Vec<u8>, ExportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["date", "kind", "description", "amount"])
            .map_err(|e| ExportError::Write(e.to_string()))?;

        for line in lines {
            let date = line.occurred_at.format(STATEMENT_DATE_FORMAT).to_string();
            let amount = line.signed_amount.to_string();
            writer
                .write_record([
                    date.as_str(),
                    line.kind.as_str(),
                    line.description.as_str(),
                    amount.as_str(),
                ])
                .map_err(|e| ExportError::Write(e.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|e| ExportError::Write(e.to_string()))
    }
}
