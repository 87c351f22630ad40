//! Cache Store Module
//!
//! Namespaced view over a shared cache engine.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::{normalize, Cache, Lookup, SEPARATOR};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// Prefixes every entry with a namespace so unrelated callers sharing one
/// engine cannot collide.
///
/// Entry names are case-insensitive. Names containing the separator are cut
/// off at its first occurrence.
#[derive(Debug, Clone)]
pub struct Store {
    cache: Arc<Cache>,
    namespace: String,
    default_ttl: Option<u64>,
}

impl Store {
    // == Constructor ==
    /// Creates a store over `cache`.
    ///
    /// # Arguments
    /// * `namespace` - Prefix for all entries; may not contain the separator
    /// * `default_ttl` - TTL in seconds used when `set` is called with `0`
    ///
    /// # Errors
    /// `InvalidName` if the namespace is empty or contains the separator.
    pub fn new(cache: Arc<Cache>, namespace: &str, default_ttl: Option<u64>) -> Result<Self> {
        if namespace.contains(SEPARATOR) {
            return Err(CacheError::InvalidName(format!(
                "Store namespace '{}' cannot contain '{}'",
                namespace, SEPARATOR
            )));
        }

        Ok(Self {
            cache,
            namespace: normalize(namespace)?,
            default_ttl,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn default_ttl(&self) -> Option<u64> {
        self.default_ttl
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    fn key(&self, name: &str) -> Result<String> {
        Ok(format!("{}{}{}", self.namespace, SEPARATOR, normalize(name)?))
    }

    // == Set ==
    /// Stores `value` under `name`.
    ///
    /// A `ttl` of `0` falls back to the store's default TTL; without one the
    /// entry never expires.
    pub fn set<T: Serialize + ?Sized>(&self, name: &str, value: &T, ttl: u64) -> Result<bool> {
        let key = self.key(name)?;

        let ttl = match (ttl, self.default_ttl) {
            (0, Some(default_ttl)) => default_ttl,
            _ => ttl,
        };

        self.cache.set(&key, value, ttl)
    }

    // == Get ==
    /// Retrieves the entry under `name`; an unusable name is an `Error`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Lookup<T> {
        match self.key(name) {
            Ok(key) => self.cache.get(&key),
            Err(e) => {
                debug!(namespace = %self.namespace, error = %e, "rejecting store lookup");
                Lookup::Error
            }
        }
    }

    // == Delete ==
    pub fn delete(&self, name: &str) -> bool {
        match self.key(name) {
            Ok(key) => self.cache.delete(&key),
            Err(_) => false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_enabled()
    }
}
