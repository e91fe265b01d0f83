//! Deposits and transfers, applied atomically against the account store and
//! the ledger.
//!
//! Lock order is always account(s) first, then the ledger. Account locks for
//! a transfer are taken in username order by [`AccountStore::with_pair`].

use std::sync::Arc;

use futures::StreamExt;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::dlq::TracingDlq;
use crate::domain::{
    DeadLetterQueue, EntryKind, Error, LedgerEntry, Money, Operation, OperationStream,
    PendingEntry,
};
use crate::ledger::{HistoryFilter, Ledger, SortOrder};
use crate::store::AccountStore;

pub const DEFAULT_DEPOSIT_SOURCE: &str = "external";

/// Both ledger entries written by a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub outgoing: LedgerEntry,
    pub incoming: LedgerEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountStatus {
    pub username: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub history_count: usize,
}

/// Stored balance versus the balance derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub username: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub stored: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub derived: Decimal,
    pub balanced: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    pub applied: usize,
    pub rejected: usize,
}

#[derive(Debug)]
pub struct TransferEngine<D = TracingDlq>
where
    D: DeadLetterQueue,
{
    accounts: Arc<AccountStore>,
    ledger: Arc<Ledger>,
    dlq: D,
}

impl<D> TransferEngine<D>
where
    D: DeadLetterQueue,
{
    pub fn new(accounts: Arc<AccountStore>, ledger: Arc<Ledger>, dlq: D) -> Self {
        Self {
            accounts,
            ledger,
            dlq,
        }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn dlq(&self) -> &D {
        &self.dlq
    }

    pub fn deposit(&self, username: &str, amount: Decimal) -> Result<LedgerEntry, Error> {
        self.deposit_from(username, amount, DEFAULT_DEPOSIT_SOURCE)
    }

    pub fn deposit_from(
        &self,
        username: &str,
        amount: Decimal,
        source: &str,
    ) -> Result<LedgerEntry, Error> {
        let result = self.apply_deposit(username, amount, source);
        self.reported(result)
    }

    pub fn transfer(
        &self,
        from_user: &str,
        to_user: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt, Error> {
        let result = self.apply_transfer(from_user, to_user, amount);
        self.reported(result)
    }

    pub fn status(&self, username: &str) -> Result<AccountStatus, Error> {
        // Entries for a user are only appended while its lock is held.
        self.accounts
            .with_account(username, |account| AccountStatus {
                username: account.username.clone(),
                balance: account.balance,
                history_count: self.ledger.count_for(&account.username),
            })
            .ok_or_else(|| Error::NotFound(username.to_string()))
    }

    pub fn history(
        &self,
        username: &str,
        filter: HistoryFilter,
        order: SortOrder,
    ) -> Result<Vec<LedgerEntry>, Error> {
        let username = username.trim();
        if !self.accounts.exists(username) {
            return Err(Error::NotFound(username.to_string()));
        }
        Ok(self.ledger.history(username, filter, order))
    }

    pub fn reconcile(&self, username: &str) -> Result<Reconciliation, Error> {
        self.accounts
            .with_account(username, |account| {
                let derived = self
                    .ledger
                    .replay_balance(&account.username, account.opening_balance);
                Reconciliation {
                    username: account.username.clone(),
                    stored: account.balance,
                    derived,
                    balanced: account.balance == derived,
                }
            })
            .ok_or_else(|| Error::NotFound(username.to_string()))
    }

    pub fn reconcile_all(&self) -> Vec<Reconciliation> {
        self.accounts
            .usernames()
            .iter()
            .filter_map(|name| self.reconcile(name).ok())
            .collect()
    }

    /// Rebuilds the ledger from a previously exported journal and applies
    /// each entry to its owner's balance. Must run on a fresh ledger, after
    /// the accounts are seeded and before any new operation. Stops at the
    /// first bad entry.
    pub fn restore<I>(&self, entries: I) -> Result<usize, Error>
    where
        I: IntoIterator<Item = Result<LedgerEntry, Error>>,
    {
        let mut restored = 0;
        for entry in entries {
            let entry = entry?;
            let owner = entry.primary_user.clone();
            self.accounts
                .with_account(&owner, |account| {
                    let balance = if entry.kind.is_income() {
                        account.balance_after_credit(entry.amount)?
                    } else {
                        account.balance_after_debit(entry.amount)?
                    };
                    self.ledger.restore(entry)?;
                    account.balance = balance;
                    Ok::<_, Error>(())
                })
                .ok_or(Error::UnknownAccount(owner))??;
            restored += 1;
        }

        tracing::info!(restored, "ledger restored from journal");
        Ok(restored)
    }

    /// Applies every operation from `source`. Failures go to the dead letter
    /// queue and processing continues.
    pub async fn process<S>(&self, source: &mut S) -> ProcessSummary
    where
        S: OperationStream,
    {
        let mut ops = source.stream();
        let mut summary = ProcessSummary::default();

        while let Some(op) = ops.next().await {
            let outcome = match op {
                Ok(op) => self.apply(op),
                Err(e) => {
                    self.dlq.report(&e);
                    Err(e)
                }
            };
            match outcome {
                Ok(()) => summary.applied += 1,
                Err(_) => summary.rejected += 1,
            }
        }

        tracing::info!(
            applied = summary.applied,
            rejected = summary.rejected,
            "operation stream drained"
        );
        summary
    }

    pub fn apply(&self, op: Operation) -> Result<(), Error> {
        tracing::debug!(%op, "applying operation");
        match op {
            Operation::Deposit {
                user,
                amount,
                source,
            } => {
                let source = source.as_deref().unwrap_or(DEFAULT_DEPOSIT_SOURCE);
                self.deposit_from(&user, amount.amount(), source).map(|_| ())
            }
            Operation::Transfer { from, to, amount } => {
                self.transfer(&from, &to, amount.amount()).map(|_| ())
            }
        }
    }

    fn reported<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(e) = &result {
            self.dlq.report(e);
        }
        result
    }

    fn apply_deposit(
        &self,
        username: &str,
        amount: Decimal,
        source: &str,
    ) -> Result<LedgerEntry, Error> {
        let amount = Money::new(amount)?.amount();
        let source = match source.trim() {
            "" => DEFAULT_DEPOSIT_SOURCE,
            s => s,
        };

        let entry = self
            .accounts
            .with_account(username, |account| {
                let balance = account.balance_after_credit(amount)?;
                let entry = self.ledger.record(PendingEntry {
                    kind: EntryKind::Deposit,
                    primary_user: account.username.clone(),
                    counterparty: None,
                    amount,
                    resulting_balance: balance,
                    description: format!("Deposit of {} from {}", amount.normalize(), source),
                });
                account.balance = balance;
                Ok::<_, Error>(entry)
            })
            .ok_or_else(|| Error::UnknownAccount(username.to_string()))??;

        tracing::info!(
            username,
            %amount,
            balance = %entry.resulting_balance,
            entry = entry.id,
            "deposit committed"
        );
        Ok(entry)
    }

    fn apply_transfer(
        &self,
        from_user: &str,
        to_user: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt, Error> {
        let amount = Money::new(amount)?.amount();
        if from_user.trim() == to_user.trim() {
            return Err(Error::SameAccount(from_user.to_string()));
        }

        let (outgoing, incoming) = self
            .accounts
            .with_pair(from_user, to_user, |sender, recipient| {
                // Validate both sides before touching anything.
                let sender_balance = sender.balance_after_debit(amount)?;
                let recipient_balance = recipient.balance_after_credit(amount)?;

                let entries = self.ledger.record_transfer(
                    PendingEntry {
                        kind: EntryKind::TransferOut,
                        primary_user: sender.username.clone(),
                        counterparty: Some(recipient.username.clone()),
                        amount,
                        resulting_balance: sender_balance,
                        description: format!(
                            "Transfer of {} to {}",
                            amount.normalize(),
                            recipient.username
                        ),
                    },
                    PendingEntry {
                        kind: EntryKind::TransferIn,
                        primary_user: recipient.username.clone(),
                        counterparty: Some(sender.username.clone()),
                        amount,
                        resulting_balance: recipient_balance,
                        description: format!(
                            "Transfer of {} from {}",
                            amount.normalize(),
                            sender.username
                        ),
                    },
                );
                sender.balance = sender_balance;
                recipient.balance = recipient_balance;
                Ok(entries)
            })?;

        tracing::info!(
            from = from_user,
            to = to_user,
            %amount,
            correlation = outgoing.id,
            "transfer committed"
        );
        Ok(TransferReceipt { outgoing, incoming })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::pin::Pin;

    use futures::stream::{self, Stream};
    use parking_lot::Mutex;
    use proptest::prelude::*;

    #[derive(Default)]
    struct RecordingDlq(Mutex<Vec<String>>);

    impl DeadLetterQueue for RecordingDlq {
        fn report(&self, error: &Error) {
            self.0.lock().push(error.to_string());
        }
    }

    struct VecStream(Option<Vec<Result<Operation, Error>>>);

    impl OperationStream for VecStream {
        type OpStream = Pin<Box<dyn Stream<Item = Result<Operation, Error>> + Send>>;

        fn stream(&mut self) -> Self::OpStream {
            Box::pin(stream::iter(self.0.take().unwrap_or_default()))
        }
    }

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn money(v: i64) -> Money {
        Money::new(dec(v)).unwrap()
    }

    fn engine_with(accounts: &[(&str, i64)]) -> TransferEngine<RecordingDlq> {
        let store = AccountStore::new();
        for (name, balance) in accounts {
            store.open(name, dec(*balance)).unwrap();
        }
        TransferEngine::new(
            Arc::new(store),
            Arc::new(Ledger::new()),
            RecordingDlq::default(),
        )
    }

    #[test]
    fn restore_replays_journal_onto_seeded_accounts() {
        let first = engine_with(&[("alice", 100), ("bob", 0)]);
        first.deposit_from("alice", dec(50), "bank").unwrap();
        first.transfer("alice", "bob", dec(20)).unwrap();

        let second = engine_with(&[("alice", 100), ("bob", 0)]);
        let restored = second
            .restore(first.ledger().entries().into_iter().map(Ok))
            .unwrap();
        assert_eq!(restored, 3);
        assert_eq!(second.ledger().entries(), first.ledger().entries());
        assert_eq!(second.accounts().get_balance("alice").unwrap(), dec(130));
        assert_eq!(second.accounts().get_balance("bob").unwrap(), dec(20));
        assert!(second.reconcile_all().iter().all(|r| r.balanced));

        // New work continues after the restored entries.
        assert_eq!(second.deposit("bob", dec(1)).unwrap().id, 4);
    }

    #[test]
    fn restore_rejects_entries_for_unknown_accounts() {
        let first = engine_with(&[("alice", 100), ("bob", 0)]);
        first.transfer("alice", "bob", dec(20)).unwrap();

        let second = engine_with(&[("alice", 100)]);
        let err = second
            .restore(first.ledger().entries().into_iter().map(Ok))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAccount(name) if name == "bob"));
    }

    #[test]
    fn padded_usernames_resolve_to_stored_accounts() {
        let engine = engine_with(&[("alice", 100), ("bob", 0)]);
        let receipt = engine.transfer(" alice", "bob ", dec(10)).unwrap();
        assert_eq!(receipt.outgoing.primary_user, "alice");
        assert_eq!(receipt.incoming.primary_user, "bob");
        assert_eq!(engine.deposit(" bob", dec(1)).unwrap().primary_user, "bob");

        assert_eq!(engine.status(" alice").unwrap().history_count, 1);
        assert_eq!(
            engine
                .history("bob ", HistoryFilter::All, SortOrder::Asc)
                .unwrap()
                .len(),
            2
        );
        assert!(engine.reconcile(" bob").unwrap().balanced);
        assert!(matches!(
            engine.transfer("bob", " bob", dec(1)),
            Err(Error::SameAccount(_))
        ));
    }

    #[test]
    fn deposit_then_overdrawn_transfer() {
        let engine = engine_with(&[("alice", 100), ("bob", 0)]);

        let entry = engine.deposit("alice", dec(50)).unwrap();
        assert_eq!(entry.kind, EntryKind::Deposit);
        assert_eq!(entry.resulting_balance, dec(150));
        assert_eq!(entry.counterparty, None);
        assert_eq!(engine.accounts().get_balance("alice").unwrap(), dec(150));

        let err = engine.transfer("alice", "bob", dec(200)).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert_eq!(engine.accounts().get_balance("alice").unwrap(), dec(150));
        assert_eq!(engine.accounts().get_balance("bob").unwrap(), dec(0));
        assert_eq!(engine.ledger().len(), 1);
        assert_eq!(engine.dlq().0.lock().len(), 1);
    }

    #[test]
    fn transfer_moves_exact_amount_and_writes_two_entries() {
        let engine = engine_with(&[("alice", 100), ("bob", 10)]);
        let total = engine.accounts().total();

        let receipt = engine.transfer("alice", "bob", dec(30)).unwrap();
        assert_eq!(engine.accounts().get_balance("alice").unwrap(), dec(70));
        assert_eq!(engine.accounts().get_balance("bob").unwrap(), dec(40));
        assert_eq!(engine.accounts().total(), total);

        assert_eq!(receipt.outgoing.kind, EntryKind::TransferOut);
        assert_eq!(receipt.outgoing.resulting_balance, dec(70));
        assert_eq!(receipt.outgoing.counterparty.as_deref(), Some("bob"));
        assert_eq!(receipt.incoming.kind, EntryKind::TransferIn);
        assert_eq!(receipt.incoming.resulting_balance, dec(40));
        assert_eq!(receipt.incoming.counterparty.as_deref(), Some("alice"));
        assert_eq!(receipt.outgoing.correlation_id, Some(receipt.outgoing.id));
        assert_eq!(receipt.incoming.correlation_id, Some(receipt.outgoing.id));
        assert_eq!(receipt.outgoing.description, "Transfer of 30 to bob");
    }

    #[test]
    fn rejected_transfers_change_nothing() {
        let engine = engine_with(&[("alice", 100), ("bob", 0)]);

        assert!(matches!(
            engine.transfer("alice", "bob", dec(0)),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.transfer("alice", "bob", dec(-5)),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.transfer("alice", "alice", dec(5)),
            Err(Error::SameAccount(_))
        ));
        assert!(matches!(
            engine.transfer("alice", "carol", dec(5)),
            Err(Error::UnknownAccount(_))
        ));
        assert!(matches!(
            engine.transfer("carol", "alice", dec(5)),
            Err(Error::UnknownAccount(_))
        ));

        assert_eq!(engine.accounts().get_balance("alice").unwrap(), dec(100));
        assert_eq!(engine.accounts().get_balance("bob").unwrap(), dec(0));
        assert!(engine.ledger().is_empty());
        assert_eq!(engine.dlq().0.lock().len(), 5);
    }

    #[test]
    fn invalid_amount_is_checked_before_same_account() {
        let engine = engine_with(&[("alice", 100)]);
        assert!(matches!(
            engine.transfer("alice", "alice", dec(0)),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn deposit_rejects_bad_input() {
        let engine = engine_with(&[("alice", 100)]);
        assert!(matches!(
            engine.deposit("alice", dec(0)),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.deposit("carol", dec(5)),
            Err(Error::UnknownAccount(_))
        ));
        assert!(engine.ledger().is_empty());
    }

    #[test]
    fn deposit_records_source_in_description() {
        let engine = engine_with(&[("alice", 0)]);
        let entry = engine.deposit_from("alice", dec(25), "card").unwrap();
        assert_eq!(entry.description, "Deposit of 25 from card");
        let entry = engine.deposit_from("alice", dec(1), " ").unwrap();
        assert_eq!(entry.description, "Deposit of 1 from external");
    }

    #[test]
    fn deposit_rounds_to_four_places() {
        let engine = engine_with(&[("alice", 0)]);
        let entry = engine
            .deposit("alice", Decimal::new(123_455, 5))
            .unwrap();
        assert_eq!(entry.amount, Decimal::new(12_346, 4));
    }

    #[test]
    fn status_history_and_reconcile() {
        let engine = engine_with(&[("alice", 100), ("bob", 0)]);
        engine.deposit("alice", dec(50)).unwrap();
        engine.transfer("alice", "bob", dec(20)).unwrap();
        engine.transfer("bob", "alice", dec(5)).unwrap();

        let status = engine.status("alice").unwrap();
        assert_eq!(status.balance, dec(135));
        assert_eq!(status.history_count, 3);
        assert!(matches!(engine.status("carol"), Err(Error::NotFound(_))));

        let income = engine
            .history("alice", HistoryFilter::Income, SortOrder::Asc)
            .unwrap();
        assert_eq!(income.len(), 2);
        assert!(income.iter().all(|e| e.kind.is_income()));
        let expenses = engine
            .history("alice", HistoryFilter::Expenses, SortOrder::Desc)
            .unwrap();
        assert_eq!(expenses.len(), 1);
        assert!(matches!(
            engine.history("carol", HistoryFilter::All, SortOrder::Asc),
            Err(Error::NotFound(_))
        ));

        let report = engine.reconcile_all();
        assert_eq!(report.len(), 2);
        assert!(report.iter().all(|r| r.balanced));
    }

    #[tokio::test]
    async fn process_applies_stream_and_reports_failures() {
        let engine = engine_with(&[("alice", 100), ("bob", 0)]);
        let mut source = VecStream(Some(vec![
            Ok(Operation::Deposit {
                user: "alice".into(),
                amount: money(50),
                source: Some("bank".into()),
            }),
            Ok(Operation::Transfer {
                from: "alice".into(),
                to: "bob".into(),
                amount: money(500),
            }),
            Err(Error::Ingestion("bad row".into())),
            Ok(Operation::Transfer {
                from: "alice".into(),
                to: "bob".into(),
                amount: money(75),
            }),
        ]));

        let summary = engine.process(&mut source).await;
        assert_eq!(
            summary,
            ProcessSummary {
                applied: 2,
                rejected: 2
            }
        );
        assert_eq!(engine.accounts().get_balance("alice").unwrap(), dec(75));
        assert_eq!(engine.accounts().get_balance("bob").unwrap(), dec(75));
        assert_eq!(engine.dlq().0.lock().len(), 2);
    }

    #[test]
    fn opposing_transfers_do_not_deadlock() {
        let engine = engine_with(&[("alice", 1_000), ("bob", 1_000), ("carol", 1_000)]);
        let names = ["alice", "bob", "carol"];

        std::thread::scope(|scope| {
            for t in 0..6 {
                let engine = &engine;
                scope.spawn(move || {
                    for i in 0..500 {
                        let from = names[(t + i) % 3];
                        let to = names[(t + i + 1 + t % 2) % 3];
                        let _ = engine.transfer(from, to, dec(((i % 7) + 1) as i64));
                    }
                });
            }
        });

        assert_eq!(engine.accounts().total(), dec(3_000));
        for (_, balance) in engine.accounts().snapshot() {
            assert!(balance >= Decimal::ZERO);
        }
        assert!(engine.reconcile_all().iter().all(|r| r.balanced));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Any mix of deposits and transfers keeps balances non-negative,
        /// moves money only through deposits and agrees with the ledger.
        #[test]
        fn balances_stay_consistent(
            ops in prop::collection::vec((0u8..2, 0usize..3, 0usize..3, 1i64..300), 1..60)
        ) {
            let names = ["alice", "bob", "carol"];
            let engine = engine_with(&[("alice", 100), ("bob", 50), ("carol", 0)]);
            let mut expected_total = dec(150);
            let mut expected_entries = 0;

            for (kind, a, b, amount) in ops {
                if kind == 0 {
                    if engine.deposit(names[a], dec(amount)).is_ok() {
                        expected_total += dec(amount);
                        expected_entries += 1;
                    }
                } else if engine.transfer(names[a], names[b], dec(amount)).is_ok() {
                    expected_entries += 2;
                }

                for (_, balance) in engine.accounts().snapshot() {
                    prop_assert!(balance >= Decimal::ZERO);
                }
                prop_assert_eq!(engine.accounts().total(), expected_total);
            }

            prop_assert_eq!(engine.ledger().len(), expected_entries);
            prop_assert!(engine.reconcile_all().iter().all(|r| r.balanced));
        }
    }
}
