//! Per-allowance async locks
//!
//! An adapter transfer reads the allowance, maybe approves, then spends it in
//! `send`. Two transfers on the same `(signer, token, spender)` must not
//! interleave between those steps.

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllowanceKey {
    pub signer: Address,
    pub token: Address,
    pub spender: Address,
}

#[derive(Default)]
pub struct AllowanceLocks {
    locks: DashMap<AllowanceKey, Arc<Mutex<()>>>,
}

impl AllowanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of the allowance; released when the guard drops
    pub async fn acquire(&self, key: AllowanceKey) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
