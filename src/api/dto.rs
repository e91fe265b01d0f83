use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::LedgerEntry;

// -------------------------
// Request DTOs
// -------------------------

/// `amount` is kept raw so that non-numeric input is reported as an invalid
/// amount rather than a malformed body.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub username: String,
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_user: String,
    pub to_user: String,
    #[serde(default)]
    pub amount: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub filter: Option<String>,
    pub order: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction: LedgerEntry,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<LedgerEntry>,
}
