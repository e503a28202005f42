//! Per-account mutual exclusion.

use crate::domain::UserId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-account async locks.
///
/// Any two operations that touch the same account's balance serialize on
/// the account's lock; operations on different accounts proceed
/// concurrently. Locks are created on first use and kept for the process
/// lifetime (the account set is bounded by the user base).
#[derive(Default)]
pub struct AccountLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one account, waiting if another operation on
    /// the same account is in flight.
    pub async fn acquire(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user.as_str().to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
