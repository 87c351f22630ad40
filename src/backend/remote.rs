//! Remote Backend Module
//!
//! Stores entries on a memcached server through a [`Transport`].

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::backend::{Backend, BackendState};
use crate::cache::{Clock, Lookup, SystemClock};
use crate::error::{CacheError, Result};
use crate::transport::{
    MemcacheTransport, Transport, TransportError, TransportResult, COMPRESS_SAVINGS,
    COMPRESS_THRESHOLD,
};

// == Public Constants ==
pub const DEFAULT_PORT: u16 = 11211;

/// Longest key memcached accepts, prefix included.
pub const MAX_KEY_LENGTH: usize = 250;

/// TTLs above thirty days are read by memcached as absolute timestamps.
pub const RELATIVE_TTL_LIMIT: u64 = 2_592_000;

// == Remote Backend ==
/// A memcached-backed store.
///
/// Any transport failure drops the connection, since a timed-out or
/// half-read reply leaves it out of step with the server. Backends built
/// with [`RemoteBackend::connect`] reopen it on the next call; an injected
/// transport stays gone.
#[derive(Debug)]
pub struct RemoteBackend {
    host: String,
    port: u16,
    /// Transport-level prefix, independent of any store namespace
    prefix: String,
    transport: Mutex<Option<Box<dyn Transport>>>,
    reconnect: bool,
    clock: Arc<dyn Clock>,
}

impl RemoteBackend {
    // == Constructors ==
    /// Connects to the memcached server at `host:port`.
    ///
    /// # Errors
    /// - `InvalidName` if `prefix` is not lower-case alphanumeric
    /// - `BackendUnavailable` if the connection cannot be established
    pub fn connect(host: &str, port: u16, prefix: &str) -> Result<Self> {
        validate_prefix(prefix)?;
        let transport = open(host, port).map_err(|e| {
            CacheError::BackendUnavailable(format!(
                "Failed to connect to memcached at {}:{}: {}",
                host, port, e
            ))
        })?;

        let mut backend = Self::with_transport(host, port, prefix, transport)?;
        backend.reconnect = true;
        Ok(backend)
    }

    /// Builds a backend over an already connected transport.
    pub fn with_transport(
        host: &str,
        port: u16,
        prefix: &str,
        mut transport: Box<dyn Transport>,
    ) -> Result<Self> {
        validate_prefix(prefix)?;
        enable_compression(transport.as_mut(), host, port);

        Ok(Self {
            host: host.to_string(),
            port,
            prefix: prefix.to_string(),
            transport: Mutex::new(Some(transport)),
            reconnect: false,
            clock: Arc::new(SystemClock),
        })
    }

    /// Rebuilds a backend from an exported `host:port` endpoint, reconnecting
    /// immediately. The transport prefix is not part of the exported state.
    pub fn restore(endpoint: &str) -> Result<Self> {
        let (host, port) = endpoint
            .rsplit_once(':')
            .and_then(|(host, port)| Some((host, port.parse::<u16>().ok()?)))
            .filter(|(host, _)| !host.is_empty())
            .ok_or_else(|| {
                CacheError::InvalidName(format!("Invalid memcached endpoint '{}'", endpoint))
            })?;

        Self::connect(host, port, "")
    }

    /// Replaces the time source used for TTL conversion.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks whether the server still answers, reconnecting first if the
    /// last call dropped the connection.
    pub fn is_connected(&self) -> bool {
        self.call(|conn| conn.version()).is_ok()
    }

    fn transport(&self) -> MutexGuard<'_, Option<Box<dyn Transport>>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `op` on the live connection, opening one if needed. The
    /// connection is discarded when `op` fails.
    fn call<T>(&self, op: impl FnOnce(&mut dyn Transport) -> TransportResult<T>) -> TransportResult<T> {
        let mut slot = self.transport();
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None if self.reconnect => {
                debug!(host = %self.host, port = self.port, "reopening memcached connection");
                let mut conn = open(&self.host, self.port)?;
                enable_compression(conn.as_mut(), &self.host, self.port);
                conn
            }
            None => {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "memcached connection was dropped",
                )))
            }
        };

        let result = op(conn.as_mut());
        if result.is_ok() {
            *slot = Some(conn);
        }
        result
    }

    fn prefixed(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}:{}", self.prefix, name)
        }
    }

    /// Converts a relative TTL into what memcached expects on the wire.
    fn exptime(&self, ttl: u64) -> u64 {
        if ttl > RELATIVE_TTL_LIMIT {
            let now = u64::try_from(self.clock.now()).unwrap_or(0);
            now.saturating_add(ttl)
        } else {
            ttl
        }
    }
}

impl Backend for RemoteBackend {
    fn kind(&self) -> &'static str {
        "memcache"
    }

    fn get(&self, name: &str) -> Lookup<Vec<u8>> {
        let key = self.prefixed(name);

        match self.call(|conn| conn.get(&key)) {
            Ok(Some(bytes)) => Lookup::Hit(bytes),
            Ok(None) => Lookup::Miss,
            Err(e) => {
                warn!(key = %key, error = %e, "memcached get failed");
                Lookup::Error
            }
        }
    }

    fn set(&self, name: &str, payload: &[u8], ttl: u64) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CacheError::InvalidName(
                "Cache-entry name cannot be empty".to_string(),
            ));
        }

        let key = self.prefixed(name);
        if key.len() > MAX_KEY_LENGTH {
            debug!(key = %key, "key exceeds memcached length limit");
            return Ok(false);
        }

        let exptime = self.exptime(ttl);

        let stored = match self.call(|conn| conn.set(&key, payload, exptime)) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %key, error = %e, "memcached set failed");
                false
            }
        };

        if !stored && !self.is_connected() {
            return Err(CacheError::BackendUnavailable(format!(
                "Failed to set '{}', memcached at {}:{} appears to be disconnected",
                key, self.host, self.port
            )));
        }

        Ok(stored)
    }

    fn delete(&self, name: &str) -> bool {
        let key = self.prefixed(name);
        self.call(|conn| conn.delete(&key)).unwrap_or(false)
    }

    /// Clears the whole server, not only keys under this backend's prefix.
    fn flush(&self) -> bool {
        match self.call(|conn| conn.flush()) {
            Ok(flushed) => flushed,
            Err(e) => {
                warn!(error = %e, "memcached flush failed");
                false
            }
        }
    }

    fn state(&self) -> BackendState {
        BackendState::Remote {
            endpoint: self.endpoint(),
        }
    }
}

// == Helpers ==
fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        Ok(())
    } else {
        Err(CacheError::InvalidName(format!(
            "Invalid prefix '{}': needs to be alphanumeric",
            prefix
        )))
    }
}

fn open(host: &str, port: u16) -> TransportResult<Box<dyn Transport>> {
    Ok(Box::new(MemcacheTransport::connect(host, port)?))
}

fn enable_compression(transport: &mut dyn Transport, host: &str, port: u16) {
    if let Err(e) = transport.set_compress_threshold(COMPRESS_THRESHOLD, COMPRESS_SAVINGS) {
        warn!(host, port, error = %e, "could not enable memcached compression");
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::transport::{TransportError, TransportResult};
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct Recorded {
        items: HashMap<String, Vec<u8>>,
        exptimes: HashMap<String, u64>,
        compress: Option<(usize, f64)>,
    }

    /// In-memory stand-in for a memcached connection.
    #[derive(Debug, Clone, Default)]
    struct FakeTransport {
        state: Arc<Mutex<Recorded>>,
        connected: Arc<Mutex<bool>>,
        fail_reads: Arc<Mutex<bool>>,
        refuse_writes: Arc<Mutex<bool>>,
    }

    impl FakeTransport {
        fn new() -> Self {
            let fake = Self::default();
            *fake.connected.lock().unwrap() = true;
            fake
        }

        fn exptime(&self, key: &str) -> Option<u64> {
            self.state.lock().unwrap().exptimes.get(key).copied()
        }

        fn down() -> TransportError {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))
        }
    }

    impl Transport for FakeTransport {
        fn get(&mut self, key: &str) -> TransportResult<Option<Vec<u8>>> {
            if *self.fail_reads.lock().unwrap() || !*self.connected.lock().unwrap() {
                return Err(Self::down());
            }
            Ok(self.state.lock().unwrap().items.get(key).cloned())
        }

        fn set(&mut self, key: &str, payload: &[u8], exptime: u64) -> TransportResult<bool> {
            if !*self.connected.lock().unwrap() {
                return Err(Self::down());
            }
            if *self.refuse_writes.lock().unwrap() {
                return Ok(false);
            }
            let mut state = self.state.lock().unwrap();
            state.items.insert(key.to_string(), payload.to_vec());
            state.exptimes.insert(key.to_string(), exptime);
            Ok(true)
        }

        fn delete(&mut self, key: &str) -> TransportResult<bool> {
            Ok(self.state.lock().unwrap().items.remove(key).is_some())
        }

        fn flush(&mut self) -> TransportResult<bool> {
            self.state.lock().unwrap().items.clear();
            Ok(true)
        }

        fn version(&mut self) -> TransportResult<String> {
            if *self.connected.lock().unwrap() {
                Ok("fake".to_string())
            } else {
                Err(Self::down())
            }
        }

        fn set_compress_threshold(&mut self, threshold: usize, min_savings: f64) -> TransportResult<()> {
            self.state.lock().unwrap().compress = Some((threshold, min_savings));
            Ok(())
        }
    }

    fn backend(prefix: &str) -> (RemoteBackend, FakeTransport, Arc<ManualClock>) {
        let fake = FakeTransport::new();
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let backend = RemoteBackend::with_transport("localhost", DEFAULT_PORT, prefix, Box::new(fake.clone()))
            .unwrap()
            .with_clock(clock.clone());
        (backend, fake, clock)
    }

    #[test]
    fn test_enables_compression() {
        let (_backend, fake, _clock) = backend("");
        assert_eq!(
            fake.state.lock().unwrap().compress,
            Some((COMPRESS_THRESHOLD, COMPRESS_SAVINGS))
        );
    }

    #[test]
    fn test_set_and_get() {
        let (backend, _fake, _clock) = backend("");

        assert!(backend.set("ns:key", b"value", 60).unwrap());
        assert_eq!(backend.get("ns:key"), Lookup::Hit(b"value".to_vec()));
        assert_eq!(backend.get("ns:other"), Lookup::Miss);
    }

    #[test]
    fn test_prefix_applied() {
        let (backend, fake, _clock) = backend("app1");

        backend.set("ns:key", b"v", 10).unwrap();
        assert!(fake.state.lock().unwrap().items.contains_key("app1:ns:key"));
        assert!(backend.get("ns:key").is_hit());
        assert!(backend.delete("ns:key"));
        assert!(fake.state.lock().unwrap().items.is_empty());
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let result = RemoteBackend::with_transport(
            "localhost",
            DEFAULT_PORT,
            "Bad-Prefix",
            Box::new(FakeTransport::new()),
        );
        assert!(matches!(result, Err(CacheError::InvalidName(_))));
    }

    #[test]
    fn test_empty_name_rejected() {
        let (backend, _fake, _clock) = backend("");
        assert!(matches!(backend.set("", b"v", 1), Err(CacheError::InvalidName(_))));
        assert!(matches!(backend.set("   ", b"v", 1), Err(CacheError::InvalidName(_))));
    }

    #[test]
    fn test_short_ttl_sent_relative() {
        let (backend, fake, _clock) = backend("");

        backend.set("k", b"v", RELATIVE_TTL_LIMIT).unwrap();
        assert_eq!(fake.exptime("k"), Some(RELATIVE_TTL_LIMIT));

        backend.set("never", b"v", 0).unwrap();
        assert_eq!(fake.exptime("never"), Some(0));
    }

    #[test]
    fn test_long_ttl_sent_absolute() {
        let (backend, fake, clock) = backend("");

        backend.set("k", b"v", 2_600_000).unwrap();
        assert_eq!(fake.exptime("k"), Some(clock.now() as u64 + 2_600_000));
    }

    #[test]
    fn test_key_length_limit() {
        let (backend, fake, _clock) = backend("pre");

        let fits = "k".repeat(MAX_KEY_LENGTH - 4);
        assert!(backend.set(&fits, b"v", 1).unwrap());

        let too_long = "k".repeat(MAX_KEY_LENGTH - 3);
        assert!(!backend.set(&too_long, b"v", 1).unwrap());
        assert_eq!(fake.state.lock().unwrap().items.len(), 1);
    }

    #[test]
    fn test_refused_write_while_connected_is_soft() {
        let (backend, fake, _clock) = backend("");
        *fake.refuse_writes.lock().unwrap() = true;

        assert!(!backend.set("k", b"v", 1).unwrap());
    }

    #[test]
    fn test_failed_write_while_disconnected_escalates() {
        let (backend, fake, _clock) = backend("");
        *fake.connected.lock().unwrap() = false;

        assert!(matches!(
            backend.set("k", b"v", 1),
            Err(CacheError::BackendUnavailable(_))
        ));
        assert!(!backend.is_connected());
    }

    #[test]
    fn test_transport_failure_on_get_is_error() {
        let (backend, fake, _clock) = backend("");
        backend.set("k", b"v", 10).unwrap();
        *fake.fail_reads.lock().unwrap() = true;

        assert_eq!(backend.get("k"), Lookup::Error);
    }

    #[test]
    fn test_failed_transport_is_discarded() {
        let (backend, fake, _clock) = backend("");
        backend.set("k", b"v", 10).unwrap();

        *fake.fail_reads.lock().unwrap() = true;
        assert_eq!(backend.get("k"), Lookup::Error);

        // An injected transport is never reopened once dropped
        *fake.fail_reads.lock().unwrap() = false;
        assert_eq!(backend.get("k"), Lookup::Error);
        assert!(!backend.is_connected());
    }

    #[test]
    fn test_falsy_payload_is_hit() {
        let (backend, _fake, _clock) = backend("");
        backend.set("flag", b"false", 10).unwrap();
        assert_eq!(backend.get("flag"), Lookup::Hit(b"false".to_vec()));
    }

    #[test]
    fn test_flush_is_global() {
        let (backend, fake, _clock) = backend("mine");
        fake.state
            .lock()
            .unwrap()
            .items
            .insert("theirs:k".to_string(), b"v".to_vec());
        backend.set("k", b"v", 10).unwrap();

        assert!(backend.flush());
        assert!(fake.state.lock().unwrap().items.is_empty());
    }

    #[test]
    fn test_state_is_endpoint() {
        let (backend, _fake, _clock) = backend("abc");
        assert_eq!(
            backend.state(),
            BackendState::Remote {
                endpoint: "localhost:11211".to_string()
            }
        );
    }

    #[test]
    fn test_restore_rejects_malformed_endpoint() {
        for endpoint in ["", "nohost", ":11211", "host:port", "host:99999"] {
            assert!(
                matches!(RemoteBackend::restore(endpoint), Err(CacheError::InvalidName(_))),
                "endpoint {:?}",
                endpoint
            );
        }
    }

    #[test]
    fn test_restore_unreachable_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = RemoteBackend::restore(&format!("127.0.0.1:{}", port));
        assert!(matches!(result, Err(CacheError::BackendUnavailable(_))));
    }
}
