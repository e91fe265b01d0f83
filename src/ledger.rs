//! Append-only record of deposits and transfers.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::domain::{EntryKind, Error, LedgerEntry, PendingEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryFilter {
    #[default]
    All,
    Income,
    Expenses,
}

impl HistoryFilter {
    pub fn matches(&self, kind: EntryKind) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Income => kind.is_income(),
            HistoryFilter::Expenses => kind == EntryKind::TransferOut,
        }
    }
}

impl FromStr for HistoryFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(HistoryFilter::All),
            "income" => Ok(HistoryFilter::Income),
            "expenses" => Ok(HistoryFilter::Expenses),
            other => Err(Error::InvalidQuery(format!(
                "filter must be one of: all, income, expenses (got {other:?})"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(Error::InvalidQuery(format!(
                "order must be one of: asc, desc (got {other:?})"
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    // username -> positions in `entries`
    by_user: HashMap<String, Vec<usize>>,
}

impl LedgerState {
    /// Timestamps never go backwards, even if the wall clock does.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.entries.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }

    /// Returns the position of the new entry; its id is `position + 1`.
    fn push(
        &mut self,
        pending: PendingEntry,
        timestamp: DateTime<Utc>,
        correlation_id: Option<u64>,
    ) -> usize {
        let id = self.entries.len() as u64 + 1;
        self.insert(LedgerEntry {
            id,
            timestamp,
            kind: pending.kind,
            primary_user: pending.primary_user,
            counterparty: pending.counterparty,
            amount: pending.amount,
            resulting_balance: pending.resulting_balance,
            description: pending.description,
            correlation_id,
        })
    }

    fn insert(&mut self, entry: LedgerEntry) -> usize {
        let position = self.entries.len();
        self.by_user
            .entry(entry.primary_user.clone())
            .or_default()
            .push(position);
        self.entries.push(entry);
        position
    }
}

#[derive(Debug, Default)]
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry, assigning the next id and a server timestamp.
    pub fn append(&self, pending: PendingEntry) -> u64 {
        self.record(pending).id
    }

    /// Like [`Ledger::append`], returning the stored entry.
    pub fn record(&self, pending: PendingEntry) -> LedgerEntry {
        let mut state = self.state.write();
        let timestamp = state.next_timestamp();
        let position = state.push(pending, timestamp, None);
        state.entries[position].clone()
    }

    /// Appends both halves of a transfer under one lock. They share a
    /// timestamp and carry the outgoing entry's id as correlation id.
    pub fn record_transfer(
        &self,
        outgoing: PendingEntry,
        incoming: PendingEntry,
    ) -> (LedgerEntry, LedgerEntry) {
        let mut state = self.state.write();
        let timestamp = state.next_timestamp();
        let correlation = state.entries.len() as u64 + 1;
        let out = state.push(outgoing, timestamp, Some(correlation));
        let inc = state.push(incoming, timestamp, Some(correlation));
        (state.entries[out].clone(), state.entries[inc].clone())
    }

    /// Re-appends an entry read back from a journal, keeping its id,
    /// timestamp and correlation id. Ids must continue the sequence and
    /// timestamps must not go backwards.
    pub fn restore(&self, entry: LedgerEntry) -> Result<(), Error> {
        let mut state = self.state.write();
        let expected = state.entries.len() as u64 + 1;
        if entry.id != expected {
            return Err(Error::Ingestion(format!(
                "journal entry {} out of sequence, expected {}",
                entry.id, expected
            )));
        }
        if let Some(last) = state.entries.last() {
            if entry.timestamp < last.timestamp {
                return Err(Error::Ingestion(format!(
                    "journal entry {} is older than entry {}",
                    entry.id, last.id
                )));
            }
        }
        state.insert(entry);
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<LedgerEntry> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.state.read().entries.get(index).cloned()
    }

    pub fn history(
        &self,
        username: &str,
        filter: HistoryFilter,
        order: SortOrder,
    ) -> Vec<LedgerEntry> {
        let state = self.state.read();
        let mut entries: Vec<LedgerEntry> = state
            .by_user
            .get(username)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&i| &state.entries[i])
                    .filter(|entry| filter.matches(entry.kind))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(state);

        entries.sort_by(|a, b| {
            let by_time = match order {
                SortOrder::Asc => a.timestamp.cmp(&b.timestamp),
                SortOrder::Desc => b.timestamp.cmp(&a.timestamp),
            };
            by_time.then(a.id.cmp(&b.id))
        });
        entries
    }

    pub fn count_for(&self, username: &str) -> usize {
        self.state
            .read()
            .by_user
            .get(username)
            .map_or(0, |positions| positions.len())
    }

    /// Recomputes a balance from the ledger alone.
    pub fn replay_balance(&self, username: &str, opening: Decimal) -> Decimal {
        let state = self.state.read();
        state
            .by_user
            .get(username)
            .into_iter()
            .flatten()
            .map(|&i| state.entries[i].delta())
            .fold(opening, |balance, delta| balance + delta)
    }

    /// All entries in id order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.state.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
