//! Configuration Module
//!
//! Handles loading cache and server configuration from environment variables.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::backend::{Backend, FileBackend, FileOptions, RemoteBackend, CLEAR_INTERVAL, DEFAULT_PORT};
use crate::cache::{Cache, SizePolicy, MAX_VALUE_SIZE};
use crate::error::{CacheError, Result};

/// Which storage medium backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    File,
    Memcache,
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "memcache" | "memcached" => Ok(BackendKind::Memcache),
            other => Err(CacheError::BackendUnavailable(format!(
                "Unknown cache backend '{}'",
                other
            ))),
        }
    }
}

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage medium
    pub backend: BackendKind,
    /// Directory for the file backend
    pub cache_path: PathBuf,
    /// Memcached host
    pub memcache_host: String,
    /// Memcached port
    pub memcache_port: u16,
    /// Transport-level key prefix for memcached
    pub memcache_prefix: String,
    /// Namespace of the store served over HTTP
    pub namespace: String,
    /// Store-wide default TTL in seconds, 0 = none
    pub default_ttl: u64,
    /// File backend: sweep after one in this many writes
    pub clear_interval: u32,
    /// Serialized payload ceiling in bytes
    pub max_value_size: usize,
    /// Reject oversized payloads instead of only logging them
    pub strict_size: bool,
    /// HTTP server port
    pub server_port: u16,
    /// Background sweep interval in seconds, 0 = sweep inline on writes
    pub sweep_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `file` or `memcache` (default: file)
    /// - `CACHE_PATH` - File backend directory (default: `<tmp>/tiered_cache`)
    /// - `MEMCACHE_HOST` - Memcached host (default: 127.0.0.1)
    /// - `MEMCACHE_PORT` - Memcached port (default: 11211)
    /// - `MEMCACHE_PREFIX` - Alphanumeric key prefix (default: none)
    /// - `CACHE_NAMESPACE` - Store namespace (default: default)
    /// - `CACHE_DEFAULT_TTL` - Store default TTL in seconds (default: 0)
    /// - `CACHE_CLEAR_INTERVAL` - Inline sweep odds, 1 in N writes (default: 100)
    /// - `CACHE_MAX_VALUE_SIZE` - Payload ceiling in bytes (default: 4 MB)
    /// - `CACHE_STRICT_SIZE` - Reject oversized payloads (default: false)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SWEEP_INTERVAL` - Background sweep seconds, 0 disables (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            backend: env_or("CACHE_BACKEND", defaults.backend),
            cache_path: env::var("CACHE_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            memcache_host: env::var("MEMCACHE_HOST").unwrap_or(defaults.memcache_host),
            memcache_port: env_or("MEMCACHE_PORT", defaults.memcache_port),
            memcache_prefix: env::var("MEMCACHE_PREFIX").unwrap_or(defaults.memcache_prefix),
            namespace: env::var("CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            default_ttl: env_or("CACHE_DEFAULT_TTL", defaults.default_ttl),
            clear_interval: env_or("CACHE_CLEAR_INTERVAL", defaults.clear_interval),
            max_value_size: env_or("CACHE_MAX_VALUE_SIZE", defaults.max_value_size),
            strict_size: env_or("CACHE_STRICT_SIZE", defaults.strict_size),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            sweep_interval: env_or("SWEEP_INTERVAL", defaults.sweep_interval),
        }
    }

    /// Store default TTL, if one is configured.
    pub fn store_ttl(&self) -> Option<u64> {
        (self.default_ttl > 0).then_some(self.default_ttl)
    }

    fn size_policy(&self) -> SizePolicy {
        if self.strict_size {
            SizePolicy::Enforce
        } else {
            SizePolicy::Advisory
        }
    }

    /// File backend options; the inline sweep is off when a background
    /// sweep task is configured.
    pub fn file_options(&self) -> FileOptions {
        FileOptions {
            clear_interval: if self.sweep_interval > 0 {
                0
            } else {
                self.clear_interval
            },
            ..FileOptions::default()
        }
    }

    /// Builds the configured file backend, creating its directory first.
    pub fn file_backend(&self) -> Result<FileBackend> {
        fs::create_dir_all(&self.cache_path).map_err(|e| {
            CacheError::BackendUnavailable(format!(
                "Cannot create file cache directory {}: {}",
                self.cache_path.display(),
                e
            ))
        })?;
        FileBackend::with_options(&self.cache_path, self.file_options())
    }

    /// Connects the configured memcached backend.
    pub fn remote_backend(&self) -> Result<RemoteBackend> {
        RemoteBackend::connect(&self.memcache_host, self.memcache_port, &self.memcache_prefix)
    }

    /// Builds the configured engine.
    ///
    /// For the file backend, a shared handle is handed back as well so a
    /// background sweep task can work on the same directory.
    pub fn build_cache(&self) -> Result<(Arc<Cache>, Option<Arc<FileBackend>>)> {
        let (backend, sweepable) = match self.backend {
            BackendKind::File => {
                let file = Arc::new(self.file_backend()?);
                (Box::new(file.clone()) as Box<dyn Backend>, Some(file))
            }
            BackendKind::Memcache => {
                (Box::new(self.remote_backend()?) as Box<dyn Backend>, None)
            }
        };

        let cache = Cache::from_boxed(backend)
            .with_size_limit(self.max_value_size, self.size_policy());
        Ok((Arc::new(cache), sweepable))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            cache_path: env::temp_dir().join("tiered_cache"),
            memcache_host: "127.0.0.1".to_string(),
            memcache_port: DEFAULT_PORT,
            memcache_prefix: String::new(),
            namespace: "default".to_string(),
            default_ttl: 0,
            clear_interval: CLEAR_INTERVAL,
            max_value_size: MAX_VALUE_SIZE,
            strict_size: false,
            server_port: 3000,
            sweep_interval: 0,
        }
    }
}

/// Parses `key` from the environment, falling back to `default` when it is
/// unset or unparseable. A bad value is logged, never silently dropped.
fn env_or<T: FromStr + std::fmt::Debug>(key: &str, default: T) -> T {
    let Ok(raw) = env::var(key) else {
        return default;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(
                "Ignoring invalid {}={:?}, using default {:?}",
                key, raw, default
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.memcache_port, 11211);
        assert_eq!(config.namespace, "default");
        assert_eq!(config.default_ttl, 0);
        assert_eq!(config.clear_interval, 100);
        assert_eq!(config.max_value_size, 4 * 1024 * 1024);
        assert!(!config.strict_size);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.sweep_interval, 0);
        assert_eq!(config.store_ttl(), None);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for key in [
            "CACHE_BACKEND",
            "CACHE_PATH",
            "MEMCACHE_PORT",
            "CACHE_DEFAULT_TTL",
            "SERVER_PORT",
            "SWEEP_INTERVAL",
        ] {
            env::remove_var(key);
        }

        let config = Config::from_env();
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.memcache_port, 11211);
        assert_eq!(config.default_ttl, 0);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.sweep_interval, 0);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("file".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert_eq!(" Memcached ".parse::<BackendKind>().unwrap(), BackendKind::Memcache);
        assert!("redis".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_background_sweep_disables_inline_sweep() {
        let config = Config {
            sweep_interval: 30,
            ..Config::default()
        };
        assert_eq!(config.file_options().clear_interval, 0);

        let config = Config {
            clear_interval: 7,
            ..Config::default()
        };
        assert_eq!(config.file_options().clear_interval, 7);
    }

    #[test]
    fn test_config_from_env_invalid_values_fall_back() {
        env::set_var("CACHE_BACKEND", "redis");
        env::set_var("CACHE_CLEAR_INTERVAL", "often");

        let config = Config::from_env();
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.clear_interval, CLEAR_INTERVAL);

        env::remove_var("CACHE_BACKEND");
        env::remove_var("CACHE_CLEAR_INTERVAL");
    }

    #[test]
    fn test_build_cache_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            cache_path: dir.path().join("nested").join("tiered_cache"),
            ..Config::default()
        };

        let (cache, _) = config.build_cache().unwrap();
        assert!(config.cache_path.is_dir());
        assert!(cache.set("k", "v", 0).unwrap());
    }

    #[test]
    fn test_build_cache_unusable_path() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        fs::write(&plain, b"x").unwrap();

        let config = Config {
            cache_path: plain.join("cache"),
            ..Config::default()
        };
        assert!(matches!(
            config.build_cache(),
            Err(CacheError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_store_ttl() {
        let config = Config {
            default_ttl: 600,
            ..Config::default()
        };
        assert_eq!(config.store_ttl(), Some(600));
    }

    #[test]
    fn test_build_file_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            cache_path: dir.path().to_path_buf(),
            strict_size: true,
            max_value_size: 8,
            ..Config::default()
        };

        let (cache, sweepable) = config.build_cache().unwrap();
        assert_eq!(cache.kind(), "file");
        assert!(sweepable.is_some());
        assert!(matches!(
            cache.set("k", "far too long", 0),
            Err(CacheError::ValueTooLarge { .. })
        ));
    }
}
