use std::io::Read;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::Deserialize;

use crate::domain::traits::OperationStream;
use crate::domain::{DeadLetterQueue, EntryKind, Error, LedgerEntry, Money, Operation};
use crate::store::AccountStore;

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
}

/// Reads wallet operations (`type,user,counterparty,amount`) from CSV.
pub struct CsvReader<R: Read> {
    reader: Option<csv::Reader<R>>,
}

impl<R: Read> CsvReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(csv_reader(reader)),
        }
    }
}

/// Internal shape used only for CSV deserialization.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "type")]
    kind: String,
    user: String,
    counterparty: Option<String>,
    amount: Option<Money>,
}

impl TryFrom<CsvRow> for Operation {
    type Error = Error;

    fn try_from(row: CsvRow) -> Result<Self, Self::Error> {
        let op = match (
            row.kind.trim().to_ascii_lowercase().as_str(),
            row.counterparty,
            row.amount,
        ) {
            ("deposit", source, Some(amount)) => Operation::Deposit {
                user: row.user,
                amount,
                source,
            },
            ("transfer", Some(to), Some(amount)) => Operation::Transfer {
                from: row.user,
                to,
                amount,
            },
            ("transfer", None, _) => {
                return Err(Error::Ingestion(format!(
                    "Transfer from {} has no counterparty",
                    row.user
                )));
            }
            (kind @ ("deposit" | "transfer"), _, None) => {
                return Err(Error::Ingestion(format!(
                    "{} for {} has no amount",
                    kind, row.user
                )));
            }
            (other, _, _) => {
                return Err(Error::Ingestion(format!(
                    "Invalid operation type: {}",
                    other
                )));
            }
        };

        Ok(op)
    }
}

impl<R: Read + Send + 'static> OperationStream for CsvReader<R> {
    type OpStream = Pin<Box<dyn Stream<Item = Result<Operation, Error>> + Send>>;

    fn stream(&mut self) -> Self::OpStream {
        // Take ownership of the reader so the iterator we build owns all data and is 'static.
        let reader = match self.reader.take() {
            Some(r) => r,
            None => {
                // Already consumed; return an empty stream.
                return Box::pin(stream::iter(Vec::<Result<Operation, Error>>::new()));
            }
        };

        let iter = reader
            .into_deserialize::<CsvRow>()
            .map(|row_res| match row_res {
                Ok(row) => Operation::try_from(row),
                Err(e) => Err(Error::Ingestion(format!(
                    "CSV deserialization error: {}",
                    e
                ))),
            });

        Box::pin(stream::iter(iter))
    }
}

/// One row of the accounts seed file (`username,balance`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSeed {
    pub username: String,
    pub balance: rust_decimal::Decimal,
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    username: String,
    balance: String,
}

pub fn read_account_seeds<R: Read>(reader: R) -> impl Iterator<Item = Result<AccountSeed, Error>> {
    csv_reader(reader)
        .into_deserialize::<SeedRow>()
        .map(|row_res| -> Result<AccountSeed, Error> {
            let row = row_res.map_err(|e| {
                Error::Ingestion(format!("CSV deserialization error: {}", e))
            })?;
            Ok(AccountSeed {
                balance: Money::balance_from_str(&row.balance)?,
                username: row.username,
            })
        })
}

/// Opens every account in the seed file. Bad rows and duplicates are
/// reported and skipped; returns the number of accounts opened.
pub fn seed_accounts<R, D>(reader: R, store: &AccountStore, dlq: &D) -> usize
where
    R: Read,
    D: DeadLetterQueue,
{
    let mut opened = 0;
    for seed in read_account_seeds(reader) {
        match seed.and_then(|s| store.open(&s.username, s.balance)) {
            Ok(()) => opened += 1,
            Err(e) => dlq.report(&e),
        }
    }
    tracing::info!(opened, "accounts seeded");
    opened
}

/// One row of a journal written by [`crate::output::CsvOutput::write_journal`].
#[derive(Debug, Deserialize)]
struct JournalRow {
    id: u64,
    date: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    owner: String,
    counterparty: Option<String>,
    amount: String,
    balance: String,
    description: String,
    correlation_id: Option<u64>,
}

impl TryFrom<JournalRow> for LedgerEntry {
    type Error = Error;

    fn try_from(row: JournalRow) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&row.date)
            .map_err(|e| {
                Error::Ingestion(format!("entry {}: bad date {:?}: {}", row.id, row.date, e))
            })?
            .with_timezone(&Utc);

        Ok(LedgerEntry {
            id: row.id,
            timestamp,
            kind: row.kind,
            primary_user: row.owner,
            counterparty: row.counterparty,
            amount: Money::from_decimal_str(&row.amount)?.amount(),
            resulting_balance: Money::balance_from_str(&row.balance)?,
            description: row.description,
            correlation_id: row.correlation_id,
        })
    }
}

/// Reads back a ledger journal. Unlike operation files, a bad row is an
/// error for the caller; the journal is not skipped over piecemeal.
pub fn read_journal<R: Read>(reader: R) -> impl Iterator<Item = Result<LedgerEntry, Error>> {
    csv_reader(reader)
        .into_deserialize::<JournalRow>()
        .map(|row_res| -> Result<LedgerEntry, Error> {
            let row = row_res.map_err(|e| {
                Error::Ingestion(format!("journal deserialization error: {}", e))
            })?;
            LedgerEntry::try_from(row)
        })
}
