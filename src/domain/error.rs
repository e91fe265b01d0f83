use rust_decimal::Decimal;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("Ingestion failed with: {0}")]
    Ingestion(String),

    #[error("Invalid amount {0:?}: amount must be a positive number")]
    InvalidAmount(String),

    #[error("Cannot transfer from {0} to the same account")]
    SameAccount(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Insufficient funds for {username}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        username: String,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Account already exists: {0}")]
    DuplicateAccount(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}
