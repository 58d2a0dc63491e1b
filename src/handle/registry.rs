use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;
use tracing::trace;

use crate::constants::FIRST_HANDLE;
use crate::constants::HANDLE_SHARDS;
use crate::metrics::LIVE_HANDLES_METRIC;

/// Opaque, stable object identity
pub type Handle = u64;

struct Shard<T> {
    items: RwLock<HashMap<Handle, T>>,
}

impl<T> Shard<T> {
    fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

/// Sharded concurrent `Handle -> T` table
///
/// `T` is usually an `Arc<..>` so lookups hand out cheap clones.
pub struct HandleRegistry<T> {
    shards: Vec<Shard<T>>,
    next: AtomicU64,
    name: &'static str,
}

impl<T> fmt::Debug for HandleRegistry<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("name", &self.name)
            .field("next", &self.next)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Clone + Send + Sync> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new("default")
    }
}

impl<T> HandleRegistry<T> {
    /// `name` labels the registry in logs and metrics.
    pub fn new(name: &'static str) -> Self {
        Self {
            shards: (0..HANDLE_SHARDS).map(|_| Shard::new()).collect(),
            next: AtomicU64::new(FIRST_HANDLE),
            name,
        }
    }

    #[inline]
    fn shard(
        &self,
        handle: Handle,
    ) -> &Shard<T> {
        &self.shards[(handle % HANDLE_SHARDS as u64) as usize]
    }

    pub fn contains(
        &self,
        handle: Handle,
    ) -> bool {
        self.shard(handle).items.read().contains_key(&handle)
    }

    /// Number of live handles. Shards are read one at a time, so the result
    /// is a snapshot only under quiescence.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.items.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.items.read().is_empty())
    }
}

impl<T: Clone + Send + Sync> HandleRegistry<T> {
    /// Register `value` under a fresh handle.
    pub fn store(
        &self,
        value: T,
    ) -> Handle {
        let handle = self.next.fetch_add(1, Ordering::Relaxed);
        self.set(handle, value);
        trace!(registry = self.name, handle, "handle stored");
        handle
    }

    /// Place `value` under a caller-chosen handle, replacing any previous value.
    ///
    /// Used when the handle is derived from the object itself. The caller is
    /// responsible for not colliding with handles issued by [`store`](Self::store).
    pub fn set(
        &self,
        handle: Handle,
        value: T,
    ) {
        let previous = self.shard(handle).items.write().insert(handle, value);
        if previous.is_none() {
            LIVE_HANDLES_METRIC.with_label_values(&[self.name]).inc();
        }
    }

    pub fn get(
        &self,
        handle: Handle,
    ) -> Option<T> {
        self.shard(handle).items.read().get(&handle).cloned()
    }

    /// Trusted lookup.
    ///
    /// # Panics
    ///
    /// Panics when `handle` is not registered. Only call this where the
    /// handle's existence is guaranteed by the caller's own prior logic.
    pub fn get_or_panic(
        &self,
        handle: Handle,
    ) -> T {
        match self.get(handle) {
            Some(value) => value,
            None => panic!("{}: no object registered for handle {}", self.name, handle),
        }
    }

    /// Trusted lookup for a handle carried as a decimal string.
    ///
    /// # Panics
    ///
    /// Panics when `handle` does not parse or is not registered.
    pub fn parse_and_get_or_panic(
        &self,
        handle: &str,
    ) -> T {
        match handle.parse::<Handle>() {
            Ok(h) => self.get_or_panic(h),
            Err(e) => panic!("{}: cannot convert handle {:?} to u64: {}", self.name, handle, e),
        }
    }

    /// Remove a mapping. Deleting an unknown handle is a no-op.
    pub fn delete(
        &self,
        handle: Handle,
    ) -> Option<T> {
        let removed = self.shard(handle).items.write().remove(&handle);
        if removed.is_some() {
            LIVE_HANDLES_METRIC.with_label_values(&[self.name]).dec();
            trace!(registry = self.name, handle, "handle deleted");
        }
        removed
    }
}
