use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    TransferOut,
    TransferIn,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::TransferOut => "transfer_out",
            EntryKind::TransferIn => "transfer_in",
        }
    }

    pub fn is_income(&self) -> bool {
        matches!(self, EntryKind::Deposit | EntryKind::TransferIn)
    }
}

/// An immutable ledger record. `resulting_balance` is the owner's balance
/// immediately after the entry was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: u64,
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(rename = "owner")]
    pub primary_user: String,
    pub counterparty: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "balance", with = "rust_decimal::serde::float")]
    pub resulting_balance: Decimal,
    pub description: String,
    pub correlation_id: Option<u64>,
}

impl LedgerEntry {
    /// Signed effect of this entry on its owner's balance.
    pub fn delta(&self) -> Decimal {
        match self.kind {
            EntryKind::Deposit | EntryKind::TransferIn => self.amount,
            EntryKind::TransferOut => -self.amount,
        }
    }
}

/// Entry contents before the ledger assigns an id and a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub kind: EntryKind,
    pub primary_user: String,
    pub counterparty: Option<String>,
    pub amount: Decimal,
    pub resulting_balance: Decimal,
    pub description: String,
}

/// A wallet operation as read from a batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Deposit {
        user: String,
        amount: Money,
        source: Option<String>,
    },
    Transfer {
        from: String,
        to: String,
        amount: Money,
    },
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Operation::Deposit { user, amount, .. } => {
                write!(f, "deposit,user={},amount={}", user, amount)
            }
            Operation::Transfer { from, to, amount } => {
                write!(f, "transfer,from={},to={},amount={}", from, to, amount)
            }
        }
    }
}
