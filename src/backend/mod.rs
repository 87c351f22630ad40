//! Storage Backend Module
//!
//! Byte-oriented storage media behind the cache engine.
//!
//! # Backends
//! - File: one file per entry, expiry tracked in the file modification time
//! - Remote: a memcached server reached through a [`Transport`](crate::transport::Transport)

mod file;
mod remote;

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::Lookup;
use crate::error::Result;

pub use file::{FileBackend, FileOptions, CLEAR_INTERVAL, ENTRY_SUFFIX, TTL_FUTURE};
pub use remote::{RemoteBackend, DEFAULT_PORT, MAX_KEY_LENGTH, RELATIVE_TTL_LIMIT};

// == Backend Trait ==
/// Raw get/set/delete/flush over byte payloads.
///
/// A `ttl` of zero means "never expire", whatever that translates to for the
/// medium. Implementations never raise from `get`, `delete` or `flush`.
pub trait Backend: Send + Sync + Debug {
    /// Short identifier used in logs and health output.
    fn kind(&self) -> &'static str;

    fn get(&self, name: &str) -> Lookup<Vec<u8>>;

    /// Stores `payload` under `name`.
    ///
    /// `Ok(false)` means the write did not happen; `Err` is reserved for an
    /// invalid name or a medium that has gone away entirely.
    fn set(&self, name: &str, payload: &[u8], ttl: u64) -> Result<bool>;

    fn delete(&self, name: &str) -> bool;

    /// Removes every entry the medium holds.
    fn flush(&self) -> bool;

    /// Configuration needed to rebuild this backend elsewhere.
    fn state(&self) -> BackendState;
}

/// Lets one backend be shared, e.g. between an engine and a sweep task.
impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    fn get(&self, name: &str) -> Lookup<Vec<u8>> {
        (**self).get(name)
    }

    fn set(&self, name: &str, payload: &[u8], ttl: u64) -> Result<bool> {
        (**self).set(name, payload, ttl)
    }

    fn delete(&self, name: &str) -> bool {
        (**self).delete(name)
    }

    fn flush(&self) -> bool {
        (**self).flush()
    }

    fn state(&self) -> BackendState {
        (**self).state()
    }
}

// == Backend State ==
/// Restorable backend configuration; never carries live handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendState {
    File { directory: PathBuf },
    /// `host:port`
    Remote { endpoint: String },
}

impl BackendState {
    /// Rebuilds a backend from exported state.
    ///
    /// File state is restored without touching the filesystem; remote state
    /// reconnects immediately and fails with `BackendUnavailable` if it can't.
    pub fn restore(self) -> Result<Box<dyn Backend>> {
        match self {
            BackendState::File { directory } => Ok(Box::new(FileBackend::restore(directory))),
            BackendState::Remote { endpoint } => Ok(Box::new(RemoteBackend::restore(&endpoint)?)),
        }
    }
}
