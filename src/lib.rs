//! Tiered Cache - pluggable key/value caching with TTL and namespacing
//!
//! A [`Cache`] engine wraps one storage [`backend`] (files on disk or a
//! memcached server) and hands out namespaced [`Store`]s. Reads never raise:
//! they answer with a [`Lookup`] that tells a hit, a miss and a failure apart.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;
pub mod transport;

pub use api::AppState;
pub use backend::{Backend, BackendState, FileBackend, RemoteBackend};
pub use cache::{Cache, Lookup, SizePolicy, Store};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
