//! Wallet ledger: account balances, an append-only ledger and a transfer
//! engine behind a small HTTP API.

pub mod api;
pub mod config;
pub mod dlq;
pub mod domain;
pub mod engine;
pub mod ingestion;
pub mod ledger;
pub mod output;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use dlq::TracingDlq;
pub use domain::{EntryKind, Error, LedgerEntry, Money};
pub use engine::TransferEngine;
pub use ledger::{HistoryFilter, Ledger, SortOrder};
pub use store::AccountStore;
