//! The store: root object owning every shared service
//!
//! A store is rooted at one directory (or an injected backend) and owns the
//! identifier source, type factory, object cache, transaction manager, and
//! the directory watcher for its lifetime. Repository handles are cached by
//! name. Dropping the store stops the watcher thread.

use crate::bucket::Bucket;
use crate::cache::ObjectCache;
use crate::repository::Repository;
use crate::typefactory::TypeFactory;
use crate::watcher::Watcher;
use dashmap::DashMap;
use shelf_concurrency::{Transaction, TransactionManager};
use shelf_core::{
    Error, IdGenerator, RandomIds, Record, RecordId, Result, StorageBackend, StoreReference,
};
use shelf_storage::FsBackend;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How often the watcher polls for out-of-band changes
pub const WATCH_INTERVAL: Duration = Duration::from_millis(200);

/// Shared services every repository and bucket of one store hangs off
pub(crate) struct StoreContext {
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) cache: Arc<ObjectCache>,
    pub(crate) types: TypeFactory,
    pub(crate) transactions: TransactionManager,
}

/// A file-backed object store
pub struct Store {
    ctx: Arc<StoreContext>,
    repositories: DashMap<String, Arc<Repository>>,
    // Held for its Drop: stops the polling thread with the store
    _watcher: Watcher,
}

impl Store {
    /// Open (or create) a store rooted at `root`
    ///
    /// Record identities come from the random generator; tests wanting
    /// deterministic ids or an in-memory backend use [`Store::open_with`].
    ///
    /// # Errors
    /// Fails with `Error::Io` if the root directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let backend = FsBackend::open(root.as_ref().join("REPOS"))?;
        Ok(Self::assemble(
            Arc::new(backend),
            Arc::new(RandomIds::default()),
        ))
    }

    /// Open a store over an injected backend and identifier source
    pub fn open_with(backend: Arc<dyn StorageBackend>, ids: Arc<dyn IdGenerator>) -> Self {
        Self::assemble(backend, ids)
    }

    fn assemble(backend: Arc<dyn StorageBackend>, ids: Arc<dyn IdGenerator>) -> Self {
        let cache = Arc::new(ObjectCache::new());
        let watcher = Watcher::spawn(Arc::clone(&backend), Arc::clone(&cache), WATCH_INTERVAL);
        let ctx = Arc::new(StoreContext {
            backend,
            types: TypeFactory::new(Arc::clone(&ids)),
            ids,
            cache,
            transactions: TransactionManager::new(),
        });
        tracing::debug!("store opened");
        Store {
            ctx,
            repositories: DashMap::new(),
            _watcher: watcher,
        }
    }

    /// Create a new repository
    ///
    /// # Errors
    /// Fails with `Error::Repository` on an empty name or a collision with
    /// an existing repository.
    pub fn make_repository(&self, name: &str) -> Result<Arc<Repository>> {
        if name.is_empty() {
            return Err(Error::repository(
                "repository name must be non-empty".to_string(),
            ));
        }
        if self.ctx.backend.prefix_exists(name)? {
            return Err(Error::repository(format!(
                "repository '{name}' already exists"
            )));
        }
        self.ctx.backend.make_prefix(name)?;
        let repository = self.cached_repository(name);
        tracing::debug!(repository = name, "repository created");
        Ok(repository)
    }

    /// Look up an existing repository
    ///
    /// # Errors
    /// Fails with `Error::Repository` if no such repository exists.
    pub fn repository(&self, name: &str) -> Result<Arc<Repository>> {
        if let Some(repository) = self.repositories.get(name) {
            return Ok(Arc::clone(&repository));
        }
        if !self.ctx.backend.prefix_exists(name)? {
            return Err(Error::repository(format!("no repository '{name}'")));
        }
        Ok(self.cached_repository(name))
    }

    // Racing openers of the same name must end up sharing one handle, so
    // required-type and index state never diverge between them
    fn cached_repository(&self, name: &str) -> Arc<Repository> {
        let entry = self
            .repositories
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Repository::open(Arc::clone(&self.ctx), name)));
        Arc::clone(entry.value())
    }

    /// Delete a repository with all its buckets and records
    ///
    /// # Errors
    /// Fails with `Error::Repository` if no such repository exists.
    pub fn delete_repository(&self, name: &str) -> Result<()> {
        if !self.ctx.backend.prefix_exists(name)? {
            return Err(Error::repository(format!("no repository '{name}'")));
        }
        self.ctx.backend.drop_prefix(name)?;
        self.repositories.remove(name);
        self.ctx.cache.evict_repository(name);
        tracing::debug!(repository = name, "repository deleted");
        Ok(())
    }

    /// Names of all repositories currently on disk
    ///
    /// # Errors
    /// Fails if the store root cannot be listed.
    pub fn repository_names(&self) -> Result<impl Iterator<Item = String>> {
        let mut names = self.ctx.backend.list_prefixes("")?;
        names.sort_unstable();
        Ok(names.into_iter())
    }

    /// Draw a fresh record identity from the store's generator
    pub fn next_free_id(&self) -> RecordId {
        self.ctx.ids.next_id()
    }

    /// The store's object cache
    pub fn object_cache(&self) -> &ObjectCache {
        &self.ctx.cache
    }

    /// The store's type registry
    pub fn type_factory(&self) -> &TypeFactory {
        &self.ctx.types
    }

    /// The store's transaction manager
    pub fn transactions(&self) -> &TransactionManager {
        &self.ctx.transactions
    }

    /// Begin a transaction
    pub fn begin(&self) -> Transaction {
        self.ctx.transactions.begin()
    }

    /// Commit a transaction against this store's backend
    ///
    /// After the writes land, the secondary indices of every updated record
    /// are refreshed to its committed state.
    ///
    /// # Errors
    /// Fails with `Error::TransactionFailed` on a version conflict (see
    /// [`TransactionManager::commit`]), or with `Error::Bucket` if the
    /// writes landed but an index could not be rewritten.
    pub fn commit(&self, txn: &mut Transaction) -> Result<()> {
        let targets: Vec<StoreReference> = txn.staged_targets().cloned().collect();
        let outcome = self
            .ctx
            .transactions
            .commit(txn, self.ctx.backend.as_ref());
        if let Err(Error::TransactionFailed(reason)) = &outcome {
            tracing::warn!(txn_id = txn.id(), %reason, "commit conflict");
        }
        outcome?;
        for target in &targets {
            self.bucket_of(target)?.refresh_indices(target.id)?;
        }
        Ok(())
    }

    /// Roll back a transaction, discarding its staged updates
    pub fn rollback(&self, txn: &mut Transaction) {
        self.ctx.transactions.rollback(txn);
    }

    /// Load the record a reference points at
    ///
    /// # Errors
    /// Fails with `Error::Repository` or `Error::Bucket` if any part of the
    /// reference no longer exists.
    pub fn resolve(&self, reference: &StoreReference) -> Result<Record> {
        self.bucket_of(reference)?.get(reference.id)
    }

    fn bucket_of(&self, reference: &StoreReference) -> Result<Arc<Bucket>> {
        self.repository(&reference.repository)?
            .bucket(&reference.bucket)
    }
}

/// Explicit resolution of lazy references through a store
pub trait ResolveReference {
    /// Load the referenced record
    ///
    /// # Errors
    /// Fails if the referenced repository, bucket, or record is gone.
    fn resolve(&self, store: &Store) -> Result<Record>;
}

impl ResolveReference for StoreReference {
    fn resolve(&self, store: &Store) -> Result<Record> {
        store.resolve(self)
    }
}
