//! Account balances, one mutex per account.
//!
//! Multi-account operations lock in lexicographic username order so two
//! transfers running in opposite directions cannot deadlock. Locks are only
//! ever held for the duration of a closure.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

use crate::domain::{Account, Error, Money};

#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: RwLock<HashMap<String, Arc<Mutex<Account>>>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn open(&self, username: &str, opening_balance: Decimal) -> Result<(), Error> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::UnknownAccount(username.to_string()));
        }
        if opening_balance < Decimal::ZERO {
            return Err(Error::InvalidAmount(opening_balance.to_string()));
        }

        let mut accounts = self.accounts.write();
        if accounts.contains_key(username) {
            return Err(Error::DuplicateAccount(username.to_string()));
        }
        accounts.insert(
            username.to_string(),
            Arc::new(Mutex::new(Account::new(username, opening_balance))),
        );
        tracing::debug!(username, %opening_balance, "account opened");
        Ok(())
    }

    pub fn exists(&self, username: &str) -> bool {
        self.handle(username).is_some()
    }

    pub fn get_balance(&self, username: &str) -> Result<Decimal, Error> {
        self.with_account(username, |account| account.balance)
            .ok_or_else(|| Error::NotFound(username.to_string()))
    }

    pub fn opening_balance(&self, username: &str) -> Result<Decimal, Error> {
        self.with_account(username, |account| account.opening_balance)
            .ok_or_else(|| Error::NotFound(username.to_string()))
    }

    pub fn credit(&self, username: &str, amount: Decimal) -> Result<Decimal, Error> {
        let amount = Money::new(amount)?.amount();
        self.with_account(username, |account| account.credit(amount))
            .ok_or_else(|| Error::NotFound(username.to_string()))?
    }

    pub fn debit(&self, username: &str, amount: Decimal) -> Result<Decimal, Error> {
        let amount = Money::new(amount)?.amount();
        self.with_account(username, |account| account.debit(amount))
            .ok_or_else(|| Error::NotFound(username.to_string()))?
    }

    /// Usernames are trimmed on lookup, the same way `open` stores them.
    fn handle(&self, username: &str) -> Option<Arc<Mutex<Account>>> {
        self.accounts.read().get(username.trim()).cloned()
    }

    /// Runs `f` with the account locked. The map lock is released before the
    /// account lock is taken. Returns `None` if the account does not exist.
    pub fn with_account<T, F>(&self, username: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut Account) -> T,
    {
        let handle = self.handle(username)?;
        let mut account = handle.lock();
        Some(f(&mut account))
    }

    /// Runs `f` with both accounts locked, sender first in the arguments.
    pub fn with_pair<T, F>(&self, from: &str, to: &str, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Account, &mut Account) -> Result<T, Error>,
    {
        let (from, to) = (from.trim(), to.trim());
        if from == to {
            return Err(Error::SameAccount(from.to_string()));
        }

        let from_handle = self
            .handle(from)
            .ok_or_else(|| Error::UnknownAccount(from.to_string()))?;
        let to_handle = self
            .handle(to)
            .ok_or_else(|| Error::UnknownAccount(to.to_string()))?;

        if from < to {
            let mut sender = from_handle.lock();
            let mut recipient = to_handle.lock();
            f(&mut sender, &mut recipient)
        } else {
            let mut recipient = to_handle.lock();
            let mut sender = from_handle.lock();
            f(&mut sender, &mut recipient)
        }
    }

    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.accounts.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Balances sorted by username. Each balance is read under its own lock.
    pub fn snapshot(&self) -> Vec<(String, Decimal)> {
        self.usernames()
            .into_iter()
            .filter_map(|name| {
                let balance = self.with_account(&name, |account| account.balance)?;
                Some((name, balance))
            })
            .collect()
    }

    pub fn total(&self) -> Decimal {
        self.snapshot().iter().map(|(_, balance)| *balance).sum()
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
