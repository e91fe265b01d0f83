//! Process configuration.

use std::path::PathBuf;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP listen address
    pub listen_addr: String,

    /// Accounts seed file (`username,balance`)
    pub accounts_csv: Option<PathBuf>,

    /// Where the ledger journal is exported on shutdown
    pub journal_csv: Option<PathBuf>,

    /// Batch mode: apply this operations file instead of serving HTTP
    pub operations_csv: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            accounts_csv: None,
            journal_csv: None,
            operations_csv: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            listen_addr: non_empty("WALLET_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            accounts_csv: non_empty("WALLET_ACCOUNTS_CSV").map(PathBuf::from),
            journal_csv: non_empty("WALLET_JOURNAL_CSV").map(PathBuf::from),
            operations_csv: None,
        }
    }

    /// Positional arguments: `[accounts.csv [operations.csv]]`.
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        if let Some(accounts) = args.next() {
            self.accounts_csv = Some(PathBuf::from(accounts));
        }
        if let Some(operations) = args.next() {
            self.operations_csv = Some(PathBuf::from(operations));
        }
        self
    }
}
