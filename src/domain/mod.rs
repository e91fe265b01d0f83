pub mod account;
pub mod error;
pub mod money;
pub mod traits;
pub mod transaction;

pub use account::Account;
pub use error::Error;
pub use money::Money;
pub use traits::{DeadLetterQueue, OperationStream};
pub use transaction::{EntryKind, LedgerEntry, Operation, PendingEntry};
