//! Shared-cache classpath pool.
//!
//! Non-system loaders that participate in the shared class cache have a pool
//! item mirroring their classpath, reachable through the *first* classpath
//! entry's extra-state slot. Unlike the rest of loader teardown, this pool is
//! also touched by non-exclusive-access paths, so every access happens under
//! the dedicated pool mutex — including the final "null the array pointer and
//! zero the count" update on the loader, which other threads read under the
//! same lock.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::classloader::{ClassLoader, ClasspathExtra};
use crate::context::VmContext;
use crate::error::{VmError, VmResult};

/// Cached classpath data owned by a pool item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathData {
    pub bytes: Vec<u8>,
}

/// Release callbacks exposed by the shared cache itself.
pub trait SharedCacheOps: Send + Sync {
    fn release_classpath_data(&self, data: ClasspathData);
}

/// Default release callback that just drops the data.
#[derive(Debug, Default)]
pub struct NoopSharedCacheOps;

impl SharedCacheOps for NoopSharedCacheOps {
    fn release_classpath_data(&self, _data: ClasspathData) {}
}

/// One pool element, keyed by the token stored in a loader's first
/// classpath entry.
#[derive(Debug)]
pub struct CachePoolItem {
    pub token: u64,
    pub cp_data: Option<ClasspathData>,
}

/// Shared-cache configuration for one VM: the classpath cache pool, its
/// mutex, and the cache's release callbacks.
pub struct SharedCacheConfig {
    pool: Mutex<Vec<CachePoolItem>>,
    ops: Arc<dyn SharedCacheOps>,
}

impl SharedCacheConfig {
    pub fn new(ops: Arc<dyn SharedCacheOps>) -> Self {
        Self {
            pool: Mutex::new(Vec::new()),
            ops,
        }
    }

    /// Register a pool item for a loader's classpath.
    pub fn register_item(&self, token: u64, cp_data: Option<ClasspathData>) -> VmResult<()> {
        let mut pool = self.pool.lock();
        if pool.iter().any(|item| item.token == token) {
            return Err(VmError::DuplicateCacheToken(token));
        }
        pool.push(CachePoolItem { token, cp_data });
        Ok(())
    }

    pub fn pool_len(&self) -> usize {
        self.pool.lock().len()
    }
}

/// Remove the loader's pool item and free its classpath-entry array.
///
/// The pool-item key is taken from the first classpath entry's extra-state
/// slot only; that entry is authoritative for the loader's shared-cache
/// association.
pub fn free_shared_cache_entries(ctx: &VmContext, loader: &mut ClassLoader) {
    let cache = match ctx.shared_cache.as_ref() {
        Some(cache) => cache,
        None => panic!("shared-cache teardown invoked without an active shared cache"),
    };

    let mut pool = cache.pool.lock();

    let token = loader
        .classpath
        .as_ref()
        .and_then(|entries| entries.first())
        .and_then(|entry| match entry.extra {
            Some(ClasspathExtra::CachePoolToken(token)) => Some(token),
            _ => None,
        });

    if let Some(token) = token {
        if let Some(index) = pool.iter().position(|item| item.token == token) {
            if let Some(data) = pool[index].cp_data.take() {
                cache.ops.release_classpath_data(data);
            }
            pool.remove(index);
        }
    }

    // Free the array and clear the pointer/count pair while still holding
    // the pool mutex.
    if loader.classpath.take().is_some() {
        ctx.stats.note_classpath_block_free();
    }
}
