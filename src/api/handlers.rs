//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.
//!
//! Backend calls block (file I/O, memcached sockets), so every handler that
//! reaches the cache hops onto the blocking pool first.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{debug, info};

use crate::cache::{normalize, Cache, Lookup, Store};
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, EnabledRequest, EnabledResponse, FlushResponse, GetResponse, HealthResponse,
    SetRequest, SetResponse, StatsResponse,
};

/// Application state shared across all handlers.
///
/// Holds the one namespaced store the server exposes; the engine behind it
/// is reachable through [`AppState::cache`].
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Store,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Creates the served store over `cache` from configuration.
    pub fn from_config(cache: Arc<Cache>, config: &crate::config::Config) -> Result<Self> {
        Ok(Self::new(cache.spawn(&config.namespace, config.store_ttl())?))
    }

    pub fn cache(&self) -> &Arc<Cache> {
        self.store.cache()
    }
}

/// Runs a blocking cache call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheError::Internal(format!("Cache task failed: {}", e)))
}

/// Handler for PUT /set
///
/// Stores any JSON value under a key with optional TTL.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    let ttl = req.ttl();
    let store = state.store.clone();
    let SetRequest { key, value, .. } = req;

    let (key, stored) = blocking(move || {
        let stored = store.set(&key, &value, ttl);
        (key, stored)
    })
    .await?;

    if !stored? {
        return Err(CacheError::BackendUnavailable(format!(
            "Write for key '{}' was not accepted",
            key
        )));
    }

    Ok(Json(SetResponse::new(key, ttl)))
}

/// Handler for GET /get/:key
///
/// Retrieves a value from the cache by key.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    normalize(&key)?;

    let store = state.store.clone();
    let (key, lookup) = blocking(move || {
        let lookup = store.get::<serde_json::Value>(&key);
        (key, lookup)
    })
    .await?;

    match lookup {
        Lookup::Hit(value) => Ok(Json(GetResponse::new(key, value))),
        Lookup::Miss => Err(CacheError::NotFound(key)),
        Lookup::Error => Err(CacheError::BackendUnavailable(format!(
            "Lookup for key '{}' failed",
            key
        ))),
    }
}

/// Handler for DELETE /del/:key
///
/// Deletes a key from the cache.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    normalize(&key)?;

    let store = state.store.clone();
    let (key, deleted) = blocking(move || {
        let deleted = store.delete(&key);
        (key, deleted)
    })
    .await?;

    if !deleted {
        return Err(CacheError::NotFound(key));
    }

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /flush
///
/// Empties the whole backend, every namespace included.
pub async fn flush_handler(State(state): State<AppState>) -> Result<Json<FlushResponse>> {
    let cache = state.cache().clone();
    let flushed = blocking(move || cache.flush()).await?;

    info!(flushed, backend = state.cache().kind(), "cache flushed");
    Ok(Json(FlushResponse { flushed }))
}

/// Handler for PUT /enabled
///
/// Turns reads on or off without touching stored entries.
pub async fn enabled_handler(
    State(state): State<AppState>,
    Json(req): Json<EnabledRequest>,
) -> Json<EnabledResponse> {
    let previous = state.cache().enable(req.enabled);
    debug!(enabled = req.enabled, previous, "cache enable toggled");

    Json(EnabledResponse {
        enabled: req.enabled,
        previous,
    })
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache().stats()))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.cache();
    Json(HealthResponse::healthy(cache.kind(), cache.is_enabled()))
}
