//! Background Tasks Module
//!
//! Contains background tasks a server may run alongside the cache.
//!
//! # Tasks
//! - Expiry Sweep: removes expired file-cache entries on a fixed interval,
//!   taking the sweep off the write path

mod sweep;

pub use sweep::spawn_sweep_task;
