//! Buckets: named collections of records
//!
//! A bucket owns one backend directory and is the only write path for the
//! records in it. Every write (first persistence or transactional update)
//! passes structural validation against the record's declared type and the
//! bucket's required type, plus reference validation of every
//! reference-valued field. Indexed buckets additionally maintain secondary
//! indices as records are persisted.

use crate::index::Index;
use crate::store::StoreContext;
use parking_lot::RwLock;
use dashmap::DashMap;
use shelf_concurrency::{version_of, Transaction, MISSING_VERSION};
use shelf_core::{
    Error, FieldKind, Record, RecordId, Result, StoreReference, TypeDescriptor, TypeLabelId, Value,
};
use shelf_storage::{read_record, write_record};
use std::collections::VecDeque;
use std::sync::Arc;

/// Subdirectory of a bucket holding persisted index files
pub(crate) const INDICES_DIR: &str = "INDICES";

/// Whether a bucket maintains secondary indices
///
/// Fixed at creation; a plain bucket can never be indexed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    /// Records only
    Plain,
    /// Records plus per-label secondary indices
    Indexed,
}

/// A named collection of records inside a repository
pub struct Bucket {
    ctx: Arc<StoreContext>,
    repository: String,
    name: String,
    kind: BucketKind,
    required_type: RwLock<Option<TypeLabelId>>,
    indices: DashMap<String, Index>,
}

impl Bucket {
    pub(crate) fn open(
        ctx: Arc<StoreContext>,
        repository: impl Into<String>,
        name: impl Into<String>,
        kind: BucketKind,
    ) -> Result<Self> {
        let bucket = Bucket {
            ctx,
            repository: repository.into(),
            name: name.into(),
            kind,
            required_type: RwLock::new(None),
            indices: DashMap::new(),
        };
        bucket.load_indices()?;
        Ok(bucket)
    }

    /// Bucket name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning repository name
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Plain or indexed
    pub fn kind(&self) -> BucketKind {
        self.kind
    }

    fn prefix(&self) -> String {
        format!("{}/{}", self.repository, self.name)
    }

    fn record_key(&self, id: RecordId) -> String {
        format!("{}/{}/{}", self.repository, self.name, id)
    }

    fn index_file_key(&self, label: &str) -> String {
        format!("{}/{}/{}/{}", self.repository, self.name, INDICES_DIR, label)
    }

    fn reference(&self, id: RecordId) -> StoreReference {
        StoreReference::new(self.repository.clone(), self.name.clone(), id)
    }

    /// Persist a record for the first time, assigning its identity
    ///
    /// Validation runs before the id is assigned, and the id only sticks
    /// once the write lands, so a rejected or failed persist leaves the
    /// record exactly as the caller built it and the call can be retried.
    ///
    /// # Errors
    /// Fails with `Error::Bucket` if the record is already persistent, its
    /// shape violates the declared or required type, a reference field does
    /// not validate, or the generated id's file already exists.
    pub fn make_persistent(&self, record: &mut Record) -> Result<RecordId> {
        if let Some(existing) = record.id() {
            return Err(Error::bucket(format!(
                "record {existing} is already persistent; use update inside a transaction"
            )));
        }
        self.validate(record)?;

        let id = self.ctx.ids.next_id();
        let key = self.record_key(id);
        if self.ctx.backend.exists(&key)? {
            return Err(Error::bucket(format!(
                "generated id {id} collides with an existing record in bucket '{}'",
                self.name
            )));
        }
        // Serialize a stamped copy; the caller's record gets its id only
        // after the write succeeds
        let mut staged = record.clone();
        staged.assign_id(id)?;
        let text = write_record(&staged)?;
        self.ctx.backend.put(&key, text.as_bytes())?;
        record.assign_id(id)?;
        let stamp = self.ctx.backend.stamp(&key)?.unwrap_or_default();
        self.ctx
            .cache
            .register(id, self.repository.clone(), self.name.clone(), stamp);
        self.maintain_indices(record, id)?;

        tracing::debug!(
            repository = %self.repository,
            bucket = %self.name,
            record_id = %id,
            "record persisted"
        );
        Ok(id)
    }

    /// Load a record by id
    ///
    /// Reference fields come back as lazy [`StoreReference`]s; targets are
    /// only loaded when the caller resolves them.
    ///
    /// # Errors
    /// Fails with `Error::Bucket` if no record with this id exists in the
    /// bucket or its file does not parse.
    pub fn get(&self, id: RecordId) -> Result<Record> {
        let key = self.record_key(id);
        let bytes = self.ctx.backend.get(&key)?.ok_or_else(|| {
            Error::bucket(format!("no record {id} in bucket '{}'", self.name))
        })?;
        self.decode(id, &bytes)
    }

    /// Stage an update of a persistent record in a transaction
    ///
    /// The write stays invisible to other readers until the transaction
    /// commits; the record's current on-disk version is recorded so a
    /// conflicting concurrent commit is detected.
    ///
    /// # Errors
    /// Fails with `Error::Bucket` if the transaction is not active, the
    /// record was never persisted, or validation rejects it.
    pub fn update(&self, txn: &mut Transaction, record: &Record) -> Result<()> {
        if !txn.is_active() {
            return Err(Error::bucket(
                "update requires an active transaction".to_string(),
            ));
        }
        let id = record.id().ok_or_else(|| {
            Error::bucket("only persistent records can be updated".to_string())
        })?;
        self.validate(record)?;

        let key = self.record_key(id);
        let version = self
            .ctx
            .backend
            .get(&key)?
            .as_deref()
            .map(version_of)
            .unwrap_or(MISSING_VERSION);
        let text = write_record(record)?;
        txn.stage_update(self.reference(id), text.into_bytes(), version)
    }

    /// Load a record through a transaction, tracking the observed version
    ///
    /// The transaction sees its own staged update of the record if there is
    /// one; otherwise the persisted state is read and its version recorded,
    /// so a commit of this transaction fails if another writer changes the
    /// record in between.
    ///
    /// # Errors
    /// Fails with `Error::TransactionFailed` if the transaction is terminal,
    /// or `Error::Bucket` if the record is absent or unparsable.
    pub fn get_tracked(&self, txn: &mut Transaction, id: RecordId) -> Result<Record> {
        txn.ensure_active()?;
        let target = self.reference(id);
        if let Some(staged) = txn.staged_read(&target) {
            return self.decode(id, staged);
        }
        let key = self.record_key(id);
        let bytes = self.ctx.backend.get(&key)?.ok_or_else(|| {
            Error::bucket(format!("no record {id} in bucket '{}'", self.name))
        })?;
        txn.record_touch(target, version_of(&bytes));
        self.decode(id, &bytes)
    }

    /// Lazy one-pass iterator over all current records
    ///
    /// The set of ids is snapshotted up front; each record file is read and
    /// parsed only when the iterator reaches it. A record deleted between
    /// snapshot and visit is skipped.
    ///
    /// # Errors
    /// Fails if the bucket directory cannot be listed.
    pub fn records(&self) -> Result<RecordIter<'_>> {
        let mut ids: Vec<RecordId> = self
            .ctx
            .backend
            .list(&self.prefix())?
            .iter()
            .filter_map(|name| name.parse::<i64>().ok())
            .filter_map(|raw| RecordId::from_i64(raw).ok())
            .collect();
        ids.sort_unstable();
        Ok(RecordIter {
            bucket: self,
            ids: ids.into(),
        })
    }

    /// Push-style writer persisting each record it is handed
    pub fn sink(&self) -> Sink<'_> {
        Sink { bucket: self }
    }

    /// Require every record written to this bucket to satisfy a type
    ///
    /// # Errors
    /// Fails with `Error::Bucket` if the type id is unregistered or the
    /// bucket already has a required type; the requirement is fixed once
    /// set.
    pub fn set_required_type(&self, type_id: TypeLabelId) -> Result<()> {
        if self.ctx.types.get(type_id).is_none() {
            return Err(Error::bucket(format!(
                "cannot require unknown type id {type_id} on bucket '{}'",
                self.name
            )));
        }
        let mut required = self.required_type.write();
        if let Some(existing) = *required {
            return Err(Error::bucket(format!(
                "bucket '{}' already requires type {existing}",
                self.name
            )));
        }
        *required = Some(type_id);
        Ok(())
    }

    /// The required type, if one was set
    pub fn required_type(&self) -> Option<TypeLabelId> {
        *self.required_type.read()
    }

    /// Build and persist a secondary index over `label`
    ///
    /// Existing records are scanned once; records persisted afterwards are
    /// added to the index as they arrive. Only scalar values are indexed.
    ///
    /// # Errors
    /// Fails with `Error::Bucket` on a plain bucket or a label that is
    /// already indexed.
    pub fn add_index(&self, label: &str) -> Result<()> {
        if self.kind != BucketKind::Indexed {
            return Err(Error::bucket(format!(
                "bucket '{}' is plain and cannot carry indices",
                self.name
            )));
        }
        if self.indices.contains_key(label) {
            return Err(Error::bucket(format!(
                "label '{label}' is already indexed in bucket '{}'",
                self.name
            )));
        }

        let mut index = Index::new(label);
        for record in self.records()? {
            let record = record?;
            if let (Some(id), Ok(value)) = (record.id(), record.get(label)) {
                index.insert(value, id);
            }
        }
        self.persist_index(&index)?;
        self.indices.insert(label.to_string(), index);
        tracing::debug!(
            repository = %self.repository,
            bucket = %self.name,
            label,
            "index built"
        );
        Ok(())
    }

    /// Snapshot of the index over `label`
    ///
    /// # Errors
    /// Fails with `Error::Bucket` if the label was never indexed.
    pub fn index(&self, label: &str) -> Result<Index> {
        self.indices
            .get(label)
            .map(|i| i.clone())
            .ok_or_else(|| {
                Error::bucket(format!(
                    "label '{label}' is not indexed in bucket '{}'",
                    self.name
                ))
            })
    }

    fn decode(&self, id: RecordId, bytes: &[u8]) -> Result<Record> {
        let text = std::str::from_utf8(bytes).map_err(|_| {
            Error::bucket(format!(
                "record {id} in bucket '{}' is not valid UTF-8",
                self.name
            ))
        })?;
        read_record(text).map_err(|e| {
            Error::bucket(format!(
                "record {id} in bucket '{}' is unparsable: {e}",
                self.name
            ))
        })
    }

    fn load_indices(&self) -> Result<()> {
        let dir = format!("{}/{}/{}", self.repository, self.name, INDICES_DIR);
        if !self.ctx.backend.prefix_exists(&dir)? {
            return Ok(());
        }
        for label in self.ctx.backend.list(&dir)? {
            if let Some(bytes) = self.ctx.backend.get(&self.index_file_key(&label))? {
                let index: Index = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::bucket(format!(
                        "index file '{label}' in bucket '{}' is unparsable: {e}",
                        self.name
                    ))
                })?;
                self.indices.insert(label, index);
            }
        }
        Ok(())
    }

    fn persist_index(&self, index: &Index) -> Result<()> {
        let bytes = serde_json::to_vec(index)
            .map_err(|e| Error::bucket(format!("cannot serialize index: {e}")))?;
        self.ctx
            .backend
            .put(&self.index_file_key(index.label()), &bytes)
    }

    fn maintain_indices(&self, record: &Record, id: RecordId) -> Result<()> {
        for mut entry in self.indices.iter_mut() {
            let label = entry.key().clone();
            if let Ok(value) = record.get(&label) {
                let value = value.clone();
                entry.insert(&value, id);
                self.persist_index(&entry)?;
            }
        }
        Ok(())
    }

    /// Re-derive every index entry of one record from its persisted state
    ///
    /// Called after a commit applies a staged update, so indices track the
    /// record's current value rather than every value it ever carried.
    pub(crate) fn refresh_indices(&self, id: RecordId) -> Result<()> {
        if self.indices.is_empty() {
            return Ok(());
        }
        let record = self.get(id)?;
        for mut entry in self.indices.iter_mut() {
            let label = entry.key().clone();
            entry.remove_id(id);
            if let Ok(value) = record.get(&label) {
                let value = value.clone();
                entry.insert(&value, id);
            }
            self.persist_index(&entry)?;
        }
        Ok(())
    }

    /// Write-time validation of a record against this bucket
    ///
    /// 1. A declared type, if present, must admit the record's shape.
    /// 2. The bucket's required type, if set, must admit it as well.
    /// 3. With neither, any shape is accepted.
    /// 4. Every reference field (and reference-list element) must point at
    ///    an existing bucket and record, and where a governing type
    ///    constrains the reference to an expected type, the target's
    ///    declared type must be structurally equivalent to it.
    fn validate(&self, record: &Record) -> Result<()> {
        let shape = record.shape();
        let mut governing: Vec<TypeDescriptor> = Vec::new();

        if let Some(declared) = record.type_label() {
            let descriptor = self.ctx.types.get(declared).ok_or_else(|| {
                Error::bucket(format!("record declares unknown type id {declared}"))
            })?;
            if !descriptor.admits_shape(&shape) {
                return Err(Error::bucket(format!(
                    "record shape does not satisfy its declared type '{}'",
                    descriptor.name()
                )));
            }
            governing.push(descriptor);
        }

        if let Some(required) = *self.required_type.read() {
            let descriptor = self.ctx.types.get(required).ok_or_else(|| {
                Error::bucket(format!(
                    "bucket '{}' requires unknown type id {required}",
                    self.name
                ))
            })?;
            if !descriptor.admits_shape(&shape) {
                return Err(Error::bucket(format!(
                    "record shape does not satisfy bucket '{}' required type '{}'",
                    self.name,
                    descriptor.name()
                )));
            }
            governing.push(descriptor);
        }

        for (label, value) in record.entries() {
            match value {
                Value::Reference(r) => self.validate_reference(label, r, &governing)?,
                Value::References(list) => {
                    for r in list {
                        self.validate_reference(label, r, &governing)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn validate_reference(
        &self,
        label: &str,
        reference: &StoreReference,
        governing: &[TypeDescriptor],
    ) -> Result<()> {
        // A cache hit for the exact location stands in for the existence
        // checks; the watcher evicts entries whose backing file changed
        let key = reference.storage_key();
        let cached = self
            .ctx
            .cache
            .locate(reference.id)
            .map_or(false, |(repository, bucket)| {
                repository == reference.repository && bucket == reference.bucket
            });
        if !cached {
            let bucket_prefix = format!("{}/{}", reference.repository, reference.bucket);
            if !self.ctx.backend.prefix_exists(&bucket_prefix)? {
                return Err(Error::bucket(format!(
                    "field '{label}' references missing bucket '{bucket_prefix}'"
                )));
            }
            if !self.ctx.backend.exists(&key)? {
                return Err(Error::bucket(format!(
                    "field '{label}' references missing record {reference}"
                )));
            }
        }

        for descriptor in governing {
            if let Some(FieldKind::Reference {
                expects: Some(expected),
            }) = descriptor.field(label)
            {
                let bytes = self.ctx.backend.get(&key)?.ok_or_else(|| {
                    Error::bucket(format!(
                        "field '{label}' references missing record {reference}"
                    ))
                })?;
                let target = self.decode(reference.id, &bytes)?;
                let target_type = target.type_label().ok_or_else(|| {
                    Error::bucket(format!(
                        "field '{label}' expects type {expected} but target {reference} \
                         declares no type"
                    ))
                })?;
                if !self.ctx.types.check_consistent(target_type, *expected)? {
                    return Err(Error::bucket(format!(
                        "field '{label}' expects type {expected} but target {reference} \
                         declares incompatible type {target_type}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Lazy iterator returned by [`Bucket::records`]
pub struct RecordIter<'a> {
    bucket: &'a Bucket,
    ids: VecDeque<RecordId>,
}

impl Iterator for RecordIter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.ids.pop_front() {
            let key = self.bucket.record_key(id);
            match self.bucket.ctx.backend.get(&key) {
                // Deleted since the snapshot: skip
                Ok(None) => continue,
                Ok(Some(bytes)) => return Some(self.bucket.decode(id, &bytes)),
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Push-style record writer returned by [`Bucket::sink`]
pub struct Sink<'a> {
    bucket: &'a Bucket,
}

impl Sink<'_> {
    /// Persist one record, assigning its identity
    ///
    /// # Errors
    /// Same failure modes as [`Bucket::make_persistent`].
    pub fn push(&mut self, record: &mut Record) -> Result<RecordId> {
        self.bucket.make_persistent(record)
    }
}
