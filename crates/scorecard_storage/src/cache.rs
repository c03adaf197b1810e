#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use scorecard_kernel_contracts::namespace::NamespaceId;
use tracing::debug;

use crate::combined::CombinedLoad;
use crate::history::HistoryTable;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachedTable {
    History,
    Combined,
}

#[derive(Debug)]
struct Slot<T> {
    loaded_at: Instant,
    value: Arc<T>,
}

#[derive(Debug)]
struct TtlMap<K, T> {
    slots: Mutex<HashMap<K, Slot<T>>>,
}

impl<K: Eq + Hash + Clone, T> TtlMap<K, T> {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &K, ttl: Duration) -> Option<Arc<T>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(key) {
            Some(slot) if slot.loaded_at.elapsed() < ttl => Some(Arc::clone(&slot.value)),
            Some(_) => {
                slots.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: K, value: Arc<T>) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                Slot {
                    loaded_at: Instant::now(),
                    value,
                },
            );
    }

    fn remove(&self, key: &K) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn contains(&self, key: &K) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

/// Read-through cache of history and combined tables, keyed by namespace and
/// table. Entries expire after the TTL or when their namespace mutates.
#[derive(Debug)]
pub struct TableCache {
    ttl: Duration,
    history: TtlMap<NamespaceId, HistoryTable>,
    combined: TtlMap<NamespaceId, CombinedLoad>,
}

impl Default for TableCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl TableCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            history: TtlMap::new(),
            combined: TtlMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn history_or_load<E, F>(&self, ns: &NamespaceId, load: F) -> Result<Arc<HistoryTable>, E>
    where
        F: FnOnce() -> Result<HistoryTable, E>,
    {
        if let Some(hit) = self.history.get(ns, self.ttl) {
            debug!(namespace = %ns, table = "history", "cache hit");
            return Ok(hit);
        }
        debug!(namespace = %ns, table = "history", "cache miss");
        let value = Arc::new(load()?);
        self.history.put(ns.clone(), Arc::clone(&value));
        Ok(value)
    }

    pub fn combined_or_load<F>(&self, ns: &NamespaceId, load: F) -> Arc<CombinedLoad>
    where
        F: FnOnce() -> CombinedLoad,
    {
        if let Some(hit) = self.combined.get(ns, self.ttl) {
            debug!(namespace = %ns, table = "combined", "cache hit");
            return hit;
        }
        debug!(namespace = %ns, table = "combined", "cache miss");
        let value = Arc::new(load());
        self.combined.put(ns.clone(), Arc::clone(&value));
        value
    }

    pub fn is_cached(&self, ns: &NamespaceId, table: CachedTable) -> bool {
        match table {
            CachedTable::History => self.history.contains(ns),
            CachedTable::Combined => self.combined.contains(ns),
        }
    }

    pub fn invalidate(&self, ns: &NamespaceId, table: CachedTable) {
        match table {
            CachedTable::History => self.history.remove(ns),
            CachedTable::Combined => self.combined.remove(ns),
        }
    }

    pub fn invalidate_namespace(&self, ns: &NamespaceId) {
        self.invalidate(ns, CachedTable::History);
        self.invalidate(ns, CachedTable::Combined);
        debug!(namespace = %ns, "cache invalidated");
    }

    pub fn invalidate_all(&self) {
        self.history.clear();
        self.combined.clear();
        debug!("cache cleared");
    }
}
