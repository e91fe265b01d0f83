use rust_decimal::Decimal;

use crate::domain::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub balance: Decimal,         // current balance, never negative
    pub opening_balance: Decimal, // balance at registration, before any ledger entry
}

impl Account {
    pub fn new(username: impl Into<String>, opening_balance: Decimal) -> Self {
        Self {
            username: username.into(),
            balance: opening_balance,
            opening_balance,
        }
    }

    pub fn balance_after_credit(&self, amount: Decimal) -> Result<Decimal, Error> {
        self.balance
            .checked_add(amount)
            .ok_or_else(|| Error::InvalidAmount(amount.to_string()))
    }

    pub fn balance_after_debit(&self, amount: Decimal) -> Result<Decimal, Error> {
        if amount > self.balance {
            return Err(Error::InsufficientFunds {
                username: self.username.clone(),
                balance: self.balance,
                requested: amount,
            });
        }
        Ok(self.balance - amount)
    }

    pub fn credit(&mut self, amount: Decimal) -> Result<Decimal, Error> {
        self.balance = self.balance_after_credit(amount)?;
        Ok(self.balance)
    }

    pub fn debit(&mut self, amount: Decimal) -> Result<Decimal, Error> {
        self.balance = self.balance_after_debit(amount)?;
        Ok(self.balance)
    }
}
