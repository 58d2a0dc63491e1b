use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::Error;
use crate::Handle;
use crate::HandleRegistry;
use crate::Result;

/// A cache that can be inspected through the diagnostics endpoint.
#[cfg_attr(test, automock)]
pub trait CacheSource: Send + Sync {
    /// Human readable name shown in the listing
    fn name(&self) -> String;

    /// Independent JSON snapshot of the cache's current state
    fn dump(&self) -> Result<Value>;
}

/// One entry of the cache listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub id: String,
    pub name: String,
}

/// Caches currently visible to the diagnostics endpoint, by id.
#[derive(Default)]
pub struct DiagnosticsRegistry {
    caches: Mutex<HashMap<String, Arc<dyn CacheSource>>>,
}

impl fmt::Debug for DiagnosticsRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut ids: Vec<String> = self.caches.lock().keys().cloned().collect();
        ids.sort();
        f.debug_struct("DiagnosticsRegistry").field("ids", &ids).finish()
    }
}

impl DiagnosticsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `source` visible under `id`. Returns the cache previously
    /// registered under the same id, if any.
    pub fn register(
        &self,
        id: impl Into<String>,
        source: Arc<dyn CacheSource>,
    ) -> Option<Arc<dyn CacheSource>> {
        let id = id.into();
        let previous = self.caches.lock().insert(id.clone(), source);
        if previous.is_some() {
            warn!(id, "diagnostics id re-registered, previous cache replaced");
        } else {
            debug!(id, "cache registered for diagnostics");
        }
        previous
    }

    /// Store `source` in `handles` and register it under the issued handle.
    pub fn register_with_handle(
        &self,
        handles: &HandleRegistry<Arc<dyn CacheSource>>,
        source: Arc<dyn CacheSource>,
    ) -> Handle {
        let handle = handles.store(source.clone());
        self.register(handle.to_string(), source);
        handle
    }

    pub fn unregister(
        &self,
        id: &str,
    ) -> bool {
        self.caches.lock().remove(id).is_some()
    }

    pub fn clear(&self) {
        self.caches.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.caches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.lock().is_empty()
    }

    /// Registered caches sorted by id.
    pub fn list(&self) -> Vec<CacheMetadata> {
        let snapshot = self.snapshot();
        let mut list: Vec<CacheMetadata> = snapshot
            .into_iter()
            .map(|(id, source)| CacheMetadata {
                id,
                name: source.name(),
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Dump the cache registered under `id`.
    ///
    /// # Errors
    /// `Error::NotFound` when no cache has that id, otherwise whatever the
    /// cache's own dump returns.
    pub fn dump(
        &self,
        id: &str,
    ) -> Result<Value> {
        // The lock is released before dumping, a dump may take a while.
        let source = self.caches.lock().get(id).cloned();
        match source {
            Some(source) => source.dump(),
            None => Err(Error::NotFound(format!("cache ({}) does not exist", id))),
        }
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn CacheSource>)> {
        self.caches
            .lock()
            .iter()
            .map(|(id, source)| (id.clone(), source.clone()))
            .collect()
    }
}
