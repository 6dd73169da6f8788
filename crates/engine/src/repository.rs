//! Repositories: named groups of buckets
//!
//! A repository is one directory level above buckets. Bucket handles are
//! cached by name, so repeated lookups share the same handle (and the same
//! loaded indices and required-type state) within one store.

use crate::bucket::{Bucket, BucketKind, INDICES_DIR};
use crate::store::StoreContext;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shelf_core::{Error, Result};
use std::sync::Arc;

/// A named group of buckets inside a store
pub struct Repository {
    ctx: Arc<StoreContext>,
    name: String,
    buckets: DashMap<String, Arc<Bucket>>,
}

impl Repository {
    pub(crate) fn open(ctx: Arc<StoreContext>, name: impl Into<String>) -> Self {
        Repository {
            ctx,
            name: name.into(),
            buckets: DashMap::new(),
        }
    }

    /// Repository name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn bucket_prefix(&self, bucket: &str) -> String {
        format!("{}/{}", self.name, bucket)
    }

    /// Create a new bucket
    ///
    /// # Errors
    /// Fails with `Error::Repository` on an empty name or a collision with
    /// an existing bucket, or with `Error::Io` if the backing directory
    /// cannot be created.
    pub fn make_bucket(&self, name: &str, kind: BucketKind) -> Result<Arc<Bucket>> {
        if name.is_empty() {
            return Err(Error::repository(
                "bucket name must be non-empty".to_string(),
            ));
        }
        let prefix = self.bucket_prefix(name);
        if self.ctx.backend.prefix_exists(&prefix)? {
            return Err(Error::repository(format!(
                "bucket '{name}' already exists in repository '{}'",
                self.name
            )));
        }
        self.ctx.backend.make_prefix(&prefix)?;
        if kind == BucketKind::Indexed {
            self.ctx
                .backend
                .make_prefix(&format!("{prefix}/{INDICES_DIR}"))?;
        }

        let bucket = self.cached_bucket(name, kind)?;
        tracing::debug!(repository = %self.name, bucket = name, ?kind, "bucket created");
        Ok(bucket)
    }

    /// Look up an existing bucket
    ///
    /// The handle is cached; a bucket created through another handle of the
    /// same store, or present on disk from an earlier run, is opened on
    /// first access. Its kind is recovered from the presence of the index
    /// subdirectory.
    ///
    /// # Errors
    /// Fails with `Error::Repository` if no such bucket exists.
    pub fn bucket(&self, name: &str) -> Result<Arc<Bucket>> {
        if let Some(bucket) = self.buckets.get(name) {
            return Ok(Arc::clone(&bucket));
        }
        let prefix = self.bucket_prefix(name);
        if !self.ctx.backend.prefix_exists(&prefix)? {
            return Err(Error::repository(format!(
                "no bucket '{name}' in repository '{}'",
                self.name
            )));
        }
        let kind = if self
            .ctx
            .backend
            .prefix_exists(&format!("{prefix}/{INDICES_DIR}"))?
        {
            BucketKind::Indexed
        } else {
            BucketKind::Plain
        };
        self.cached_bucket(name, kind)
    }

    // Racing openers of the same bucket must share one handle; a second
    // handle would carry its own required-type cell and index maps
    fn cached_bucket(&self, name: &str, kind: BucketKind) -> Result<Arc<Bucket>> {
        match self.buckets.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let bucket = Arc::new(Bucket::open(
                    Arc::clone(&self.ctx),
                    self.name.clone(),
                    name,
                    kind,
                )?);
                entry.insert(Arc::clone(&bucket));
                Ok(bucket)
            }
        }
    }

    /// Delete a bucket with all its records and indices
    ///
    /// Object-cache entries pointing into the bucket are evicted; existing
    /// handles to the bucket become dangling and fail on their next backend
    /// access.
    ///
    /// # Errors
    /// Fails with `Error::Repository` if no such bucket exists.
    pub fn delete_bucket(&self, name: &str) -> Result<()> {
        let prefix = self.bucket_prefix(name);
        if !self.ctx.backend.prefix_exists(&prefix)? {
            return Err(Error::repository(format!(
                "no bucket '{name}' in repository '{}'",
                self.name
            )));
        }
        self.ctx.backend.drop_prefix(&prefix)?;
        self.buckets.remove(name);
        self.ctx.cache.evict_bucket(&self.name, name);
        tracing::debug!(repository = %self.name, bucket = name, "bucket deleted");
        Ok(())
    }

    /// Names of all buckets currently on disk
    ///
    /// # Errors
    /// Fails if the repository directory cannot be listed.
    pub fn bucket_names(&self) -> Result<impl Iterator<Item = String>> {
        let mut names = self.ctx.backend.list_prefixes(&self.name)?;
        names.sort_unstable();
        Ok(names.into_iter())
    }
}
