//! Cache Engine Module
//!
//! Wraps one storage backend with enable/disable gating, payload
//! serialization and size validation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendState};
use crate::cache::stats::StatsCounters;
use crate::cache::{CacheStats, Lookup, Store, MAX_VALUE_SIZE};
use crate::error::{CacheError, Result};

// == Size Policy ==
/// What happens when a serialized payload exceeds the size ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizePolicy {
    /// Log a notice and store the value anyway
    #[default]
    Advisory,
    /// Refuse the write with `ValueTooLarge`
    Enforce,
}

// == Cache ==
/// A cache engine over a single backend.
///
/// Share it through an `Arc` and hand out namespaced [`Store`]s with
/// [`Cache::spawn`].
#[derive(Debug)]
pub struct Cache {
    backend: Box<dyn Backend>,
    enabled: AtomicBool,
    max_value_size: usize,
    size_policy: SizePolicy,
    stats: StatsCounters,
}

impl Cache {
    // == Constructors ==
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            enabled: AtomicBool::new(true),
            max_value_size: MAX_VALUE_SIZE,
            size_policy: SizePolicy::default(),
            stats: StatsCounters::default(),
        }
    }

    /// Overrides the payload ceiling and what happens when it is exceeded.
    pub fn with_size_limit(mut self, max_value_size: usize, policy: SizePolicy) -> Self {
        self.max_value_size = max_value_size;
        self.size_policy = policy;
        self
    }

    /// Rebuilds an engine from exported backend state.
    pub fn restore(state: BackendState) -> Result<Self> {
        Ok(Self::from_boxed(state.restore()?))
    }

    /// Plain configuration sufficient to rebuild the backend in another process.
    pub fn export_state(&self) -> BackendState {
        self.backend.state()
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn kind(&self) -> &'static str {
        self.backend.kind()
    }

    // == Enable ==
    /// Toggles reads on or off and returns the previous state.
    ///
    /// A disabled engine answers every read with `Miss` so callers recompute;
    /// writes and deletes still go through.
    pub fn enable(&self, state: bool) -> bool {
        self.enabled.swap(state, Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    // == Spawn ==
    /// Creates a namespaced store over this engine.
    pub fn spawn(self: &Arc<Self>, namespace: &str, default_ttl: Option<u64>) -> Result<Store> {
        Store::new(Arc::clone(self), namespace, default_ttl)
    }

    // == Set ==
    /// Serializes `value` and stores it under `name` for `ttl` seconds
    /// (`0` = never expire).
    ///
    /// # Errors
    /// - `ValueRejected` if the value cannot be serialized
    /// - `ValueTooLarge` under [`SizePolicy::Enforce`]
    /// - `InvalidName` or `BackendUnavailable` from the backend
    pub fn set<T: Serialize + ?Sized>(&self, name: &str, value: &T, ttl: u64) -> Result<bool> {
        let payload = serde_json::to_vec(value).map_err(|e| {
            CacheError::ValueRejected(format!("Cannot cache value for '{}': {}", name, e))
        })?;
        self.set_raw(name, &payload, ttl)
    }

    /// Stores an already encoded payload.
    pub fn set_raw(&self, name: &str, payload: &[u8], ttl: u64) -> Result<bool> {
        self.check_size(name, payload.len())?;

        let stored = self.backend.set(name, payload, ttl)?;
        if stored {
            self.stats.record_write();
        }
        Ok(stored)
    }

    // == Get ==
    /// Fetches and decodes the entry under `name`.
    ///
    /// A payload that does not decode as `T` (a torn write, a foreign value)
    /// is reported as `Error`, never as a hit or a miss.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Lookup<T> {
        let lookup = match self.fetch(name) {
            Lookup::Hit(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Lookup::Hit(value),
                Err(e) => {
                    warn!(entry = name, error = %e, "cache entry failed to decode");
                    Lookup::Error
                }
            },
            Lookup::Miss => Lookup::Miss,
            Lookup::Error => Lookup::Error,
        };
        self.record(&lookup);
        lookup
    }

    /// Fetches the raw payload under `name`.
    pub fn get_raw(&self, name: &str) -> Lookup<Vec<u8>> {
        let lookup = self.fetch(name);
        self.record(&lookup);
        lookup
    }

    // == Delete ==
    pub fn delete(&self, name: &str) -> bool {
        self.backend.delete(name)
    }

    // == Flush ==
    /// Removes every entry from the backend.
    pub fn flush(&self) -> bool {
        self.backend.flush()
    }

    fn fetch(&self, name: &str) -> Lookup<Vec<u8>> {
        if !self.is_enabled() {
            debug!(entry = name, "cache disabled, skipping lookup");
            return Lookup::Miss;
        }
        self.backend.get(name)
    }

    fn record<T>(&self, lookup: &Lookup<T>) {
        match lookup {
            Lookup::Hit(_) => self.stats.record_hit(),
            Lookup::Miss => self.stats.record_miss(),
            Lookup::Error => self.stats.record_error(),
        }
    }

    fn check_size(&self, name: &str, size: usize) -> Result<()> {
        if size <= self.max_value_size {
            return Ok(());
        }
        self.stats.record_oversized();

        match self.size_policy {
            SizePolicy::Advisory => {
                warn!(
                    entry = name,
                    size,
                    limit = self.max_value_size,
                    backend = self.kind(),
                    "value is too big to be stored in cache"
                );
                Ok(())
            }
            SizePolicy::Enforce => Err(CacheError::ValueTooLarge {
                size,
                limit: self.max_value_size,
            }),
        }
    }
}
