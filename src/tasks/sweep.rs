//! Expiry Sweep Task
//!
//! Periodically clears expired entries from a file backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::FileBackend;

/// Spawns a task that sweeps `backend` every `interval_secs` seconds.
///
/// Pair it with a backend built with `clear_interval = 0` so writers never
/// run the sweep themselves. The sweep itself runs on the blocking pool.
///
/// # Returns
/// A JoinHandle that can be aborted during shutdown.
///
/// # Example
/// ```ignore
/// let backend = Arc::new(FileBackend::with_options("/var/cache/app", options)?);
/// let sweep_handle = spawn_sweep_task(backend.clone(), 60);
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task(backend: Arc<FileBackend>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let backend = backend.clone();
            match tokio::task::spawn_blocking(move || backend.sweep_expired()).await {
                Ok(0) => debug!("Expiry sweep: no expired entries found"),
                Ok(removed) => info!("Expiry sweep: removed {} expired entries", removed),
                Err(e) => warn!(error = %e, "Expiry sweep did not complete"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, FileOptions};
    use crate::cache::{Lookup, ManualClock};
    use tempfile::TempDir;

    fn backend() -> (TempDir, Arc<FileBackend>, Arc<ManualClock>) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let options = FileOptions {
            clear_interval: 0,
            ..FileOptions::default()
        };
        let backend = FileBackend::with_options(dir.path(), options)
            .unwrap()
            .with_clock(clock.clone());
        (dir, Arc::new(backend), clock)
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let (dir, backend, clock) = backend();
        backend.set("expire_soon", b"value", 1).unwrap();
        clock.advance(5);

        let handle = spawn_sweep_task(backend.clone(), 1);

        // Wait for the first sweep to run
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(!dir.path().join("expire_soon.cache").exists());
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let (_dir, backend, _clock) = backend();
        backend.set("long_lived", b"value", 3600).unwrap();

        let handle = spawn_sweep_task(backend.clone(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(backend.get("long_lived"), Lookup::Hit(b"value".to_vec()));
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_can_be_aborted() {
        let (_dir, backend, _clock) = backend();

        let handle = spawn_sweep_task(backend, 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
