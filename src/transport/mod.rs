//! Transport Module
//!
//! The wire-level client a [`RemoteBackend`](crate::backend::RemoteBackend)
//! talks through.

mod memcache;

use thiserror::Error;

pub use memcache::{MemcacheTransport, COMPRESS_SAVINGS, COMPRESS_THRESHOLD, FLAG_COMPRESSED};

// == Transport Error ==
/// A transport-level failure, as opposed to a clean miss or a refused write.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reply did not follow the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server answered with ERROR, CLIENT_ERROR or SERVER_ERROR
    #[error("server error: {0}")]
    Server(String),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

// == Transport Trait ==
/// Operations the remote backend needs from a memcached client.
///
/// `get` returns `Ok(None)` for a miss; only a failure yields `Err`, so a
/// stored value never has to be guessed apart from an error.
pub trait Transport: Send + std::fmt::Debug {
    fn get(&mut self, key: &str) -> TransportResult<Option<Vec<u8>>>;

    /// `exptime` follows memcached rules: `0` never expires, values above
    /// thirty days are absolute Unix timestamps.
    fn set(&mut self, key: &str, payload: &[u8], exptime: u64) -> TransportResult<bool>;

    /// `Ok(false)` when the key did not exist.
    fn delete(&mut self, key: &str) -> TransportResult<bool>;

    /// Invalidates every item on the server.
    fn flush(&mut self) -> TransportResult<bool>;

    fn version(&mut self) -> TransportResult<String>;

    fn set_compress_threshold(&mut self, threshold: usize, min_savings: f64) -> TransportResult<()>;
}
