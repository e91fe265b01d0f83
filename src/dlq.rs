use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{DeadLetterQueue, Error};

/// Logs every rejected operation and keeps a running count.
#[derive(Default, Debug)]
pub struct TracingDlq {
    rejected: AtomicU64,
}

impl TracingDlq {
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl DeadLetterQueue for TracingDlq {
    fn report(&self, error: &Error) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(%error, "operation rejected");
    }
}
