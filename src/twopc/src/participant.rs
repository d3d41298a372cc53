use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use log::{info, warn};
use tokio::sync::RwLock;

use crate::config::RETRY_STEP_MS;
use crate::error::ParticipantError;
use crate::types::TransactionId;

/// Sentinel lock value meaning no transaction is mid-flight on this node.
const LOCK_FREE: i64 = -1;

/// Per-node participant state machine for two-phase commit.
///
/// A node moves through `FREE -> LOCKED -> (COMMITTED_PENDING -> APPLIED)
/// | ABORTED -> FREE`. The lock slot admits at most one transaction at a
/// time, which is what provides linearizable commit ordering per node.
///
/// The pending commit log holds payloads between `commit` and `apply`;
/// the store holds applied key-value data for the process lifetime.
pub struct ParticipantStateMachine {
    lock: AtomicI64,
    pending: RwLock<HashMap<i64, HashMap<String, String>>>,
    store: RwLock<HashMap<String, String>>,
    retry_budget: u32,
}

impl ParticipantStateMachine {
    pub fn new(retry_budget: u32) -> Self {
        ParticipantStateMachine {
            lock: AtomicI64::new(LOCK_FREE),
            pending: RwLock::new(HashMap::new()),
            store: RwLock::new(HashMap::new()),
            retry_budget,
        }
    }

    /// Attempt to acquire this node's transaction lock for `trid`.
    ///
    /// Retries the compare-and-set up to the configured budget with a
    /// linearly increasing sleep between attempts, then fails with
    /// `LockBusy` without side effects.
    pub async fn vote(&self, trid: TransactionId) -> Result<(), ParticipantError> {
        info!("vote requested for transaction {}", trid);

        let mut attempt: u32 = 0;
        while attempt < self.retry_budget {
            if self
                .lock
                .compare_exchange(LOCK_FREE, trid.raw(), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
            attempt += 1;
            warn!("vote retry {} for transaction {}", attempt, trid);
            tokio::time::sleep(Duration::from_millis(RETRY_STEP_MS * attempt as u64)).await;
        }

        if self.lock.load(Ordering::SeqCst) != trid.raw() {
            warn!("vote failed for transaction {}", trid);
            return Err(ParticipantError::LockBusy);
        }

        info!("vote approved for transaction {}", trid);
        Ok(())
    }

    /// Record `payload` in the pending commit log for `trid`.
    ///
    /// Valid only while `trid` holds the lock; a mismatch rejects without
    /// mutating state. The lock release runs regardless of the outcome,
    /// and a failed release is logged as a warning since it means the
    /// slot is held by someone else.
    pub async fn commit(
        &self,
        trid: TransactionId,
        payload: HashMap<String, String>,
    ) -> Result<(), ParticipantError> {
        info!("commit start for transaction {}", trid);

        let result = if self.lock.load(Ordering::SeqCst) != trid.raw() {
            warn!(
                "commit failed, transaction {} does not hold the lock",
                trid
            );
            Err(ParticipantError::WrongTransaction)
        } else {
            self.pending.write().await.insert(trid.raw(), payload);
            Ok(())
        };

        info!("releasing lock for transaction {}", trid);
        if self
            .lock
            .compare_exchange(trid.raw(), LOCK_FREE, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(
                "lock release for transaction {} failed, the transaction was not active",
                trid
            );
        }

        result
    }

    /// Merge a committed payload into the store.
    ///
    /// Valid only if the pending commit log holds an entry for `trid`.
    /// Every payload field is upserted, including the reserved `trid`
    /// field itself, so the id string ends up in the store as ordinary
    /// data. Callers must not use `trid` as a real data key.
    pub async fn apply(
        &self,
        trid: TransactionId,
        payload: HashMap<String, String>,
    ) -> Result<(), ParticipantError> {
        info!("apply start for transaction {}", trid);

        if !self.pending.read().await.contains_key(&trid.raw()) {
            warn!(
                "apply failed, cannot find transaction {} in the pending log",
                trid
            );
            return Err(ParticipantError::NotPending);
        }

        {
            let mut store = self.store.write().await;
            for (key, value) in &payload {
                store.insert(key.clone(), value.clone());
            }
        }
        self.pending.write().await.remove(&trid.raw());

        Ok(())
    }

    /// Release the lock if held by `trid` and drop any pending entry.
    ///
    /// Idempotent: aborting an unknown or already-aborted id is a no-op.
    pub async fn abort(&self, trid: TransactionId) {
        warn!("abort for transaction {}", trid);
        let _ = self
            .lock
            .compare_exchange(trid.raw(), LOCK_FREE, Ordering::SeqCst, Ordering::SeqCst);
        self.pending.write().await.remove(&trid.raw());
    }

    /// Immutable snapshot of the applied store.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.store.read().await.clone()
    }

    /// Number of applied keys, for metrics.
    pub async fn keys_count(&self) -> usize {
        self.store.read().await.len()
    }

    #[cfg(test)]
    fn lock_holder(&self) -> i64 {
        self.lock.load(Ordering::SeqCst)
    }
}
