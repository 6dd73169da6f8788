//! Directory watcher for out-of-band changes
//!
//! A dedicated thread polls the storage backend on a fixed interval and
//! evicts object-cache entries whose backing file was rewritten or deleted
//! outside the store. Polling never blocks foreground operations and never
//! touches file contents; a missed change leaves the cache stale at worst,
//! and the next cache miss falls through to the authoritative disk state.

use crate::cache::ObjectCache;
use parking_lot::{Condvar, Mutex};
use shelf_core::StorageBackend;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

struct Shutdown {
    requested: Mutex<bool>,
    signal: Condvar,
}

/// Background polling thread bound to one store's cache
pub struct Watcher {
    shutdown: Arc<Shutdown>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Spawn a watcher polling `backend` every `interval`
    pub(crate) fn spawn(
        backend: Arc<dyn StorageBackend>,
        cache: Arc<ObjectCache>,
        interval: Duration,
    ) -> Self {
        let shutdown = Arc::new(Shutdown {
            requested: Mutex::new(false),
            signal: Condvar::new(),
        });
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("shelf-watcher".to_string())
            .spawn(move || watch_loop(&thread_shutdown, backend.as_ref(), &cache, interval))
            .ok();
        if handle.is_none() {
            tracing::error!("failed to spawn watcher thread; external changes will not be seen");
        }
        Watcher { shutdown, handle }
    }

    /// Signal the polling thread and wait for it to exit
    pub fn stop(&mut self) {
        {
            let mut requested = self.shutdown.requested.lock();
            *requested = true;
            self.shutdown.signal.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(
    shutdown: &Shutdown,
    backend: &dyn StorageBackend,
    cache: &ObjectCache,
    interval: Duration,
) {
    loop {
        {
            let mut requested = shutdown.requested.lock();
            if *requested {
                return;
            }
            shutdown.signal.wait_for(&mut requested, interval);
            if *requested {
                return;
            }
        }
        poll_once(backend, cache);
    }
}

fn poll_once(backend: &dyn StorageBackend, cache: &ObjectCache) {
    for (id, key, registered_stamp) in cache.snapshot() {
        match backend.stamp(&key) {
            Ok(Some(stamp)) if stamp == registered_stamp => {}
            Ok(changed) => {
                cache.evict(id);
                tracing::debug!(
                    record_id = %id,
                    key = %key,
                    deleted = changed.is_none(),
                    "evicted cache entry after external change"
                );
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "watcher failed to stamp record file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::RecordId;
    use shelf_storage::MemBackend;

    fn id(v: i64) -> RecordId {
        RecordId::from_i64(v).unwrap()
    }

    #[test]
    fn test_poll_evicts_deleted_and_rewritten() {
        let backend = MemBackend::new();
        let cache = ObjectCache::new();

        backend.put("r/b/1", b"one").unwrap();
        backend.put("r/b/2", b"two").unwrap();
        backend.put("r/b/3", b"three").unwrap();
        cache.register(id(1), "r", "b", backend.stamp("r/b/1").unwrap().unwrap());
        cache.register(id(2), "r", "b", backend.stamp("r/b/2").unwrap().unwrap());
        cache.register(id(3), "r", "b", backend.stamp("r/b/3").unwrap().unwrap());

        backend.delete("r/b/1").unwrap();
        backend.put("r/b/2", b"rewritten").unwrap();

        poll_once(&backend, &cache);
        assert!(!cache.contains(id(1)));
        assert!(!cache.contains(id(2)));
        assert!(cache.contains(id(3)));
    }

    #[test]
    fn test_watcher_thread_evicts_within_interval() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemBackend::new());
        let cache = Arc::new(ObjectCache::new());

        backend.put("r/b/1", b"one").unwrap();
        cache.register(id(1), "r", "b", backend.stamp("r/b/1").unwrap().unwrap());

        let mut watcher = Watcher::spawn(
            Arc::clone(&backend),
            Arc::clone(&cache),
            Duration::from_millis(10),
        );
        backend.delete("r/b/1").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while cache.contains(id(1)) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!cache.contains(id(1)));
        watcher.stop();
    }

    #[test]
    fn test_stop_is_prompt_and_idempotent() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemBackend::new());
        let cache = Arc::new(ObjectCache::new());
        let mut watcher = Watcher::spawn(backend, cache, Duration::from_secs(3600));
        // A stop must not wait out the polling interval
        watcher.stop();
        watcher.stop();
    }
}
