//! Time-limited in-memory cache of loaded documents.
//!
//! Entries expire a fixed TTL after they are stored and are evicted lazily
//! on the next access. There is no size bound.
//!
//! Every write takes a per-key gate. [`DocumentCache::get_or_try_load`]
//! holds it across the load, so concurrent callers for the same key wait
//! for the first loader and then share its result.
//! [`DocumentCache::update`] holds it across read-modify-write, so an edit
//! never writes a stale document back over a fresher reload.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::models::LoadedDocument;

/// Default time-to-live (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.elapsed.lock()
    }
}

struct CacheEntry {
    document: Arc<LoadedDocument>,
    expires_at: Instant,
}

/// Shared cache keyed by a caller-chosen document identifier.
pub struct DocumentCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry. An expired entry is removed and reported absent.
    pub fn get(&self, key: &str) -> Option<Arc<LoadedDocument>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(Arc::clone(&entry.document)),
            Some(_) => {
                entries.remove(key);
                debug!(key, "cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Store `document`, replacing any previous entry, with a fresh TTL.
    /// Waits for any load or update in progress on `key`.
    pub fn put(&self, key: &str, document: LoadedDocument) -> Arc<LoadedDocument> {
        self.put_shared(key, Arc::new(document))
    }

    pub fn put_shared(&self, key: &str, document: Arc<LoadedDocument>) -> Arc<LoadedDocument> {
        self.with_gate(key, || self.store(key, document))
    }

    /// Replace the live entry for `key` with `edit` applied to it, under the
    /// key's gate. Returns `None` when there is no live entry.
    pub fn update<F>(&self, key: &str, edit: F) -> Option<Arc<LoadedDocument>>
    where
        F: FnOnce(&LoadedDocument) -> LoadedDocument,
    {
        self.with_gate(key, || {
            let current = self.get(key)?;
            Some(self.store(key, Arc::new(edit(&*current))))
        })
    }

    fn store(&self, key: &str, document: Arc<LoadedDocument>) -> Arc<LoadedDocument> {
        let expires_at = self.clock.now() + self.ttl;
        self.entries.lock().insert(
            key.to_string(),
            CacheEntry {
                document: Arc::clone(&document),
                expires_at,
            },
        );
        document
    }

    /// Drop the entry for `key`. Returns whether one was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until next access.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached document for `key`, or run `loader` and cache its
    /// result. Only one loader runs per key at a time; `force` skips the
    /// lookup and always reloads. Nothing is cached when `loader` fails.
    pub fn get_or_try_load<F, E>(
        &self,
        key: &str,
        force: bool,
        loader: F,
    ) -> Result<Arc<LoadedDocument>, E>
    where
        F: FnOnce() -> Result<LoadedDocument, E>,
    {
        self.with_gate(key, || match self.get(key) {
            Some(doc) if !force => Ok(doc),
            _ => loader().map(|doc| self.store(key, Arc::new(doc))),
        })
    }

    /// Run `f` holding the gate for `key`. The gate is released even if `f`
    /// panics.
    fn with_gate<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let release = GateRelease {
            cache: self,
            key,
            gate: Some(self.gate(key)),
        };
        let _held = release.gate.as_ref().map(|gate| gate.lock());
        f()
    }

    fn gate(&self, key: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock();
        Arc::clone(gates.entry(key.to_string()).or_default())
    }

    fn release_gate(&self, key: &str, gate: Arc<Mutex<()>>) {
        let mut gates = self.gates.lock();
        // Clones are only taken under `gates`, so the count is stable here.
        let waiting = Arc::strong_count(&gate) > 2;
        drop(gate);
        if !waiting {
            gates.remove(key);
        }
    }
}

struct GateRelease<'a> {
    cache: &'a DocumentCache,
    key: &'a str,
    gate: Option<Arc<Mutex<()>>>,
}

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            self.cache.release_gate(self.key, gate);
        }
    }
}

impl Default for DocumentCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
