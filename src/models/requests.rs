//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: Entry name inside the served namespace
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds (store default if absent or 0)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The entry name
    pub key: String,
    /// The value to store
    pub value: serde_json::Value,
    /// Optional TTL in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    /// TTL handed to the store; zero defers to the store default.
    pub fn ttl(&self) -> u64 {
        self.ttl.unwrap_or(0)
    }
}

/// Request body for PUT /enabled
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}
