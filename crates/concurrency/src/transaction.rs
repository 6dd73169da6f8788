//! Transaction context for optimistic concurrency control
//!
//! A transaction tracks, for every record read or updated through it, the
//! version observed at first touch, and buffers updated record bytes until
//! commit. Nothing a transaction stages is visible to other transactions or
//! to the disk before the manager commits it.

use shelf_core::{Error, Result, StoreReference};
use std::collections::HashMap;

/// Version stamp of a record that does not exist on disk
pub const MISSING_VERSION: u64 = 0;

/// Version stamp of a record's persisted bytes
///
/// Content-derived (xxh3), so two reads of an unchanged file agree and any
/// committed change to the file is observable. Never returns
/// [`MISSING_VERSION`] for existing content.
pub fn version_of(bytes: &[u8]) -> u64 {
    match xxhash_rust::xxh3::xxh3_64(bytes) {
        MISSING_VERSION => 1,
        v => v,
    }
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Committed` (conflict check passed, writes applied)
/// - `Active` → `RolledBack` (user rollback, or conflict at commit)
///
/// Both non-active states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting reads and staged updates
    Active,
    /// All staged updates were applied atomically
    Committed,
    /// Staged state was discarded
    RolledBack,
}

/// An in-progress unit of work spanning any number of buckets
pub struct Transaction {
    txn_id: u64,
    status: TransactionStatus,
    first_touch: HashMap<StoreReference, u64>,
    staged: HashMap<StoreReference, Vec<u8>>,
}

impl Transaction {
    pub(crate) fn new(txn_id: u64) -> Self {
        Transaction {
            txn_id,
            status: TransactionStatus::Active,
            first_touch: HashMap::new(),
            staged: HashMap::new(),
        }
    }

    /// Unique transaction id
    pub fn id(&self) -> u64 {
        self.txn_id
    }

    /// Current lifecycle status
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Whether the transaction still accepts operations
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Fail with `Error::TransactionFailed` unless active
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::conflict(format!(
                "transaction {} is not active: {:?}",
                self.txn_id, self.status
            )))
        }
    }

    /// Record the version of `target` as observed at first touch
    ///
    /// Later touches of the same target keep the first version; conflict
    /// detection always compares against the state the transaction first
    /// saw.
    pub fn record_touch(&mut self, target: StoreReference, version: u64) {
        self.first_touch.entry(target).or_insert(version);
    }

    /// Version recorded at first touch, if the target was touched
    pub fn touched_version(&self, target: &StoreReference) -> Option<u64> {
        self.first_touch.get(target).copied()
    }

    /// Stage updated bytes for `target`
    ///
    /// `current_version` is the persisted version the caller observed while
    /// preparing the update; it becomes the first-touch version unless the
    /// target was touched earlier. Staging the same target again replaces
    /// the buffered bytes (latest update wins) without moving first touch.
    ///
    /// # Errors
    /// Fails with `Error::TransactionFailed` if the transaction is terminal.
    pub fn stage_update(
        &mut self,
        target: StoreReference,
        bytes: Vec<u8>,
        current_version: u64,
    ) -> Result<()> {
        self.ensure_active()?;
        self.record_touch(target.clone(), current_version);
        self.staged.insert(target, bytes);
        Ok(())
    }

    /// Buffered bytes for `target`, if updated in this transaction
    ///
    /// Read-your-writes: a read through the transaction sees its own staged
    /// update before the persisted state.
    pub fn staged_read(&self, target: &StoreReference) -> Option<&[u8]> {
        self.staged.get(target).map(Vec::as_slice)
    }

    /// Number of staged updates
    pub fn pending_updates(&self) -> usize {
        self.staged.len()
    }

    /// Targets with a staged update, in no particular order
    ///
    /// Still available after commit, so callers can run per-record
    /// post-commit maintenance on exactly the records that changed.
    pub fn staged_targets(&self) -> impl Iterator<Item = &StoreReference> {
        self.staged.keys()
    }

    /// Discard staged state and mark the transaction rolled back
    ///
    /// Calling this on an already-terminal transaction is a no-op.
    pub fn rollback(&mut self) {
        if self.is_active() {
            self.staged.clear();
            self.first_touch.clear();
            self.status = TransactionStatus::RolledBack;
        }
    }

    pub(crate) fn staged_entries(&self) -> impl Iterator<Item = (&StoreReference, &[u8])> {
        self.staged.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub(crate) fn mark_committed(&mut self) {
        self.status = TransactionStatus::Committed;
    }

    pub(crate) fn mark_rolled_back(&mut self) {
        self.staged.clear();
        self.status = TransactionStatus::RolledBack;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::RecordId;

    fn target(id: i64) -> StoreReference {
        StoreReference::new("r", "b", RecordId::from_i64(id).unwrap())
    }

    #[test]
    fn test_version_of_never_missing() {
        assert_ne!(version_of(b""), MISSING_VERSION);
        assert_ne!(version_of(b"abc"), MISSING_VERSION);
        assert_eq!(version_of(b"abc"), version_of(b"abc"));
        assert_ne!(version_of(b"abc"), version_of(b"abd"));
    }

    #[test]
    fn test_new_transaction_is_active() {
        let txn = Transaction::new(1);
        assert!(txn.is_active());
        assert_eq!(txn.status(), TransactionStatus::Active);
        assert_eq!(txn.pending_updates(), 0);
    }

    #[test]
    fn test_first_touch_wins() {
        let mut txn = Transaction::new(1);
        txn.record_touch(target(5), 100);
        txn.record_touch(target(5), 200);
        assert_eq!(txn.touched_version(&target(5)), Some(100));
        assert_eq!(txn.touched_version(&target(6)), None);
    }

    #[test]
    fn test_stage_update_records_first_touch() {
        let mut txn = Transaction::new(1);
        txn.stage_update(target(5), b"v1".to_vec(), 100).unwrap();
        assert_eq!(txn.touched_version(&target(5)), Some(100));
        assert_eq!(txn.staged_read(&target(5)), Some(b"v1".as_slice()));

        // Restaging replaces bytes, keeps the first-touch version
        txn.stage_update(target(5), b"v2".to_vec(), 900).unwrap();
        assert_eq!(txn.touched_version(&target(5)), Some(100));
        assert_eq!(txn.staged_read(&target(5)), Some(b"v2".as_slice()));
        assert_eq!(txn.pending_updates(), 1);
    }

    #[test]
    fn test_staged_targets_survive_commit() {
        let mut txn = Transaction::new(1);
        txn.stage_update(target(5), b"v1".to_vec(), 100).unwrap();
        txn.stage_update(target(6), b"v2".to_vec(), 200).unwrap();
        txn.mark_committed();
        let mut targets: Vec<_> = txn.staged_targets().cloned().collect();
        targets.sort_by_key(|t| t.id);
        assert_eq!(targets, vec![target(5), target(6)]);
    }

    #[test]
    fn test_rollback_discards_and_terminates() {
        let mut txn = Transaction::new(1);
        txn.stage_update(target(5), b"v1".to_vec(), 100).unwrap();
        txn.rollback();
        assert_eq!(txn.status(), TransactionStatus::RolledBack);
        assert_eq!(txn.pending_updates(), 0);
        assert!(txn.stage_update(target(6), b"x".to_vec(), 1).is_err());
    }

    #[test]
    fn test_rollback_on_terminal_is_noop() {
        let mut txn = Transaction::new(1);
        txn.mark_committed();
        txn.rollback();
        assert_eq!(txn.status(), TransactionStatus::Committed);
    }
}
