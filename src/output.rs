use std::io::Write;

use rust_decimal::Decimal;

use crate::domain::{Error, LedgerEntry};

const BALANCE_HEADER: [&str; 2] = ["username", "balance"];
const JOURNAL_HEADER: [&str; 9] = [
    "id",
    "date",
    "type",
    "owner",
    "counterparty",
    "amount",
    "balance",
    "description",
    "correlation_id",
];

fn fixed(value: Decimal) -> String {
    format!("{:.4}", value)
}

/// CSV writer for balance reports and ledger journals. The header is always
/// written, even when there are no rows.
pub struct CsvOutput<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvOutput<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(writer),
        }
    }

    pub fn write_balances(&mut self, balances: &[(String, Decimal)]) -> Result<(), Error> {
        self.writer.write_record(BALANCE_HEADER)?;
        for (username, balance) in balances {
            self.writer
                .write_record([username.as_str(), fixed(*balance).as_str()])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_journal(&mut self, entries: &[LedgerEntry]) -> Result<(), Error> {
        self.writer.write_record(JOURNAL_HEADER)?;
        for entry in entries {
            self.writer.write_record([
                entry.id.to_string(),
                entry.timestamp.to_rfc3339(),
                entry.kind.as_str().to_string(),
                entry.primary_user.clone(),
                entry.counterparty.clone().unwrap_or_default(),
                fixed(entry.amount),
                fixed(entry.resulting_balance),
                entry.description.clone(),
                entry
                    .correlation_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, Error> {
        self.writer
            .into_inner()
            .map_err(|e| Error::IO(std::io::Error::new(e.error().kind(), e.error().to_string())))
    }
}
