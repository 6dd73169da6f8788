//! Transaction manager: begin, validate, and atomically apply transactions
//!
//! Commits are serialized through a single lock. Under that lock the manager
//! re-reads every touched record and compares its current version against the
//! version the transaction saw at first touch; any mismatch aborts the whole
//! commit. When two transactions race over the same records, exactly one
//! commits and the other fails with a conflict.

use crate::transaction::{version_of, Transaction, MISSING_VERSION};
use parking_lot::Mutex;
use shelf_core::{Error, Result, StorageBackend, StoreReference};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out transactions and applies their staged updates
#[derive(Debug, Default)]
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    commit_lock: Mutex<()>,
}

impl TransactionManager {
    /// Create a manager with no outstanding transactions
    pub fn new() -> Self {
        TransactionManager::default()
    }

    /// Begin a new transaction
    pub fn begin(&self) -> Transaction {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(txn_id = id, "transaction started");
        Transaction::new(id)
    }

    /// Validate and apply all staged updates of `txn`
    ///
    /// All-or-nothing: either every staged update reaches the backend or
    /// none does. On a version conflict the transaction is rolled back and
    /// the error reports the first conflicting record. If applying a write
    /// fails partway, records written so far are restored from their
    /// pre-images before the error is returned.
    ///
    /// # Errors
    /// - `Error::TransactionFailed` if the transaction is not active or a
    ///   touched record changed since first touch
    /// - `Error::Io` if the backend fails while reading or writing
    pub fn commit<B: StorageBackend + ?Sized>(
        &self,
        txn: &mut Transaction,
        backend: &B,
    ) -> Result<()> {
        txn.ensure_active()?;
        let _guard = self.commit_lock.lock();

        let updates: Vec<(StoreReference, Vec<u8>)> = txn
            .staged_entries()
            .map(|(target, bytes)| (target.clone(), bytes.to_vec()))
            .collect();

        // Validate every touched record against its first-touch version and
        // capture pre-images of the records about to be overwritten.
        let mut pre_images: Vec<(String, Option<Vec<u8>>)> = Vec::new();
        for (target, _) in &updates {
            let key = target.storage_key();
            let current = backend.get(&key)?;
            let current_version = current
                .as_deref()
                .map(version_of)
                .unwrap_or(MISSING_VERSION);
            let expected = txn
                .touched_version(target)
                .unwrap_or(MISSING_VERSION);
            if current_version != expected {
                tracing::debug!(
                    txn_id = txn.id(),
                    target = %target,
                    "commit conflict, rolling back"
                );
                txn.mark_rolled_back();
                return Err(Error::conflict(format!(
                    "record {target} was modified by another transaction"
                )));
            }
            pre_images.push((key, current));
        }

        // Apply. On a mid-commit failure restore the pre-images so the
        // backend never holds a partial commit.
        for (i, (target, bytes)) in updates.iter().enumerate() {
            let key = target.storage_key();
            if let Err(e) = backend.put(&key, bytes) {
                for (key, image) in pre_images.iter().take(i) {
                    let restored = match image {
                        Some(bytes) => backend.put(key, bytes),
                        None => backend.delete(key).map(|_| ()),
                    };
                    if let Err(restore_err) = restored {
                        tracing::error!(
                            txn_id = txn.id(),
                            key = %key,
                            error = %restore_err,
                            "failed to restore record after aborted commit"
                        );
                    }
                }
                txn.mark_rolled_back();
                return Err(e);
            }
        }

        let applied = updates.len();
        txn.mark_committed();
        tracing::debug!(txn_id = txn.id(), updates = applied, "transaction committed");
        Ok(())
    }

    /// Roll back `txn`, discarding its staged updates
    ///
    /// A no-op if the transaction already committed or rolled back.
    pub fn rollback(&self, txn: &mut Transaction) {
        if txn.is_active() {
            tracing::debug!(txn_id = txn.id(), "transaction rolled back");
        }
        txn.rollback();
    }
}
