//! File Backend Module
//!
//! One file per cache entry. The file content is the raw payload; expiry is
//! carried out-of-band in the file modification time (`now + ttl` at write).

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendState};
use crate::cache::{normalize_filename, Clock, Lookup, SystemClock};
use crate::error::{CacheError, Result};

// == Public Constants ==
/// One in this many successful writes triggers an expiry sweep.
pub const CLEAR_INTERVAL: u32 = 100;

/// Effective TTL for entries written without one (365 days).
pub const TTL_FUTURE: u64 = 31_536_000;

/// Suffix appended to every entry file.
pub const ENTRY_SUFFIX: &str = ".cache";

// == File Options ==
/// Tunables for [`FileBackend`].
#[derive(Debug, Clone, Copy)]
pub struct FileOptions {
    /// Sweep after one in `clear_interval` writes; `0` disables the inline sweep
    pub clear_interval: u32,
    /// Seconds used in place of "never"
    pub ttl_future: u64,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            clear_interval: CLEAR_INTERVAL,
            ttl_future: TTL_FUTURE,
        }
    }
}

// == File Backend ==
/// Filesystem-backed storage with lazy and probabilistic expiry.
#[derive(Debug)]
pub struct FileBackend {
    directory: PathBuf,
    options: FileOptions,
    clock: Arc<dyn Clock>,
}

impl FileBackend {
    // == Constructors ==
    /// Creates a backend over `directory` with default options.
    ///
    /// # Errors
    /// `BackendUnavailable` if the directory does not exist or is not writable.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(directory, FileOptions::default())
    }

    pub fn with_options(directory: impl Into<PathBuf>, options: FileOptions) -> Result<Self> {
        let mut backend = Self::restore(directory);
        ensure_writable(&backend.directory)?;
        backend.options = options;
        Ok(backend)
    }

    /// Rebuilds a backend from exported state without any I/O; a stale path
    /// surfaces on the next write.
    pub fn restore(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            options: FileOptions::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn options(&self) -> FileOptions {
        self.options
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf> {
        let file = normalize_filename(name)?;
        Ok(self.directory.join(format!("{}{}", file, ENTRY_SUFFIX)))
    }

    // == Sweep ==
    /// Deletes every entry whose expiry lies strictly before `reference`.
    ///
    /// Files that disappear while the sweep runs are not errors. Returns the
    /// number of entries cleared.
    pub fn sweep(&self, reference: i64) -> usize {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(directory = %self.directory.display(), error = %e, "cannot list cache directory");
                return 0;
            }
        };

        let mut cleared = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_entry_file(&path) {
                continue;
            }

            // Gone between listing and stat
            let Some(expires_at) = modified_secs(&path) else {
                continue;
            };

            if reference > expires_at {
                match fs::remove_file(&path) {
                    Ok(()) => cleared += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => cleared += 1,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to remove expired entry")
                    }
                }
            }
        }

        cleared
    }

    /// Sweeps against the backend's own clock.
    pub fn sweep_expired(&self) -> usize {
        self.sweep(self.clock.now())
    }

    fn should_sweep(&self) -> bool {
        match self.options.clear_interval {
            0 => false,
            n => rand::rng().random_range(1..=n) == n,
        }
    }
}

impl Backend for FileBackend {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn get(&self, name: &str) -> Lookup<Vec<u8>> {
        let path = match self.entry_path(name) {
            Ok(path) => path,
            Err(e) => {
                debug!(entry = name, error = %e, "rejecting lookup");
                return Lookup::Error;
            }
        };

        // Lazy expiry; a missing file reads as expired
        match modified_secs(&path) {
            Some(expires_at) if self.clock.now() <= expires_at => {}
            _ => return Lookup::Miss,
        }

        match fs::read(&path) {
            Ok(bytes) => Lookup::Hit(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Lookup::Miss,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache entry");
                Lookup::Error
            }
        }
    }

    fn set(&self, name: &str, payload: &[u8], ttl: u64) -> Result<bool> {
        let path = self.entry_path(name)?;

        let ttl = if ttl == 0 { self.options.ttl_future } else { ttl };
        let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
        let expires_at = self.clock.now().saturating_add(ttl);

        if let Err(e) = write_entry(&path, payload, expires_at) {
            warn!(path = %path.display(), error = %e, "failed to write cache entry");
            return Ok(false);
        }

        if self.should_sweep() {
            let cleared = self.sweep_expired();
            debug!(cleared, "swept expired cache entries");
        }

        Ok(true)
    }

    fn delete(&self, name: &str) -> bool {
        match self.entry_path(name) {
            Ok(path) => fs::remove_file(path).is_ok(),
            Err(_) => false,
        }
    }

    fn flush(&self) -> bool {
        // Explicit TTLs may reach past ttl_future, so no finite horizon is safe
        let cleared = self.sweep(i64::MAX);
        debug!(cleared, "flushed file cache");
        true
    }

    fn state(&self) -> BackendState {
        BackendState::File {
            directory: self.directory.clone(),
        }
    }
}

// == Helpers ==
fn ensure_writable(directory: &Path) -> Result<()> {
    let meta = fs::metadata(directory).map_err(|e| {
        CacheError::BackendUnavailable(format!(
            "File cache directory {} is not accessible: {}",
            directory.display(),
            e
        ))
    })?;

    if !meta.is_dir() {
        return Err(CacheError::BackendUnavailable(format!(
            "File cache path {} is not a directory",
            directory.display()
        )));
    }

    // Permission bits alone miss ownership and ACLs; write a scratch file
    tempfile::NamedTempFile::new_in(directory).map_err(|e| {
        CacheError::BackendUnavailable(format!(
            "File cache directory {} is not writable: {}",
            directory.display(),
            e
        ))
    })?;

    Ok(())
}

/// Writes, closes, then stamps the expiry; all three must succeed.
fn write_entry(path: &Path, payload: &[u8], expires_at: i64) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(payload)?;
    file.flush()?;
    drop(file);

    let expiry = to_system_time(expires_at).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "expiry time out of range")
    })?;

    File::options().write(true).open(path)?.set_modified(expiry)
}

fn is_entry_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.len() > ENTRY_SUFFIX.len() && name.ends_with(ENTRY_SUFFIX))
}

fn modified_secs(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let secs = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_secs()).unwrap_or(i64::MAX),
    };
    Some(secs)
}

fn to_system_time(secs: i64) -> Option<SystemTime> {
    if secs >= 0 {
        UNIX_EPOCH.checked_add(Duration::from_secs(secs.unsigned_abs()))
    } else {
        UNIX_EPOCH.checked_sub(Duration::from_secs(secs.unsigned_abs()))
    }
}
