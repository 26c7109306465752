//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.
//!
//! Calls that may scan a file backend run on the blocking thread pool.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::cache::{pattern, CacheManager, StatsSnapshot};
use crate::error::{CacheError, Result};
use crate::keys::validate_pattern;
use crate::models::{
    ClearResponse, HealthResponse, InvalidateOperationRequest, InvalidateResponse, KeysQuery,
    KeysResponse, OperationInvalidationResponse, RulesValidationResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
}

impl AppState {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }
}

/// Runs `f` against the cache on the blocking pool.
async fn with_cache<T, F>(state: &AppState, f: F) -> Result<T>
where
    F: FnOnce(&CacheManager) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let cache = Arc::clone(&state.cache);
    tokio::task::spawn_blocking(move || f(cache.as_ref()))
        .await
        .map_err(|e| CacheError::Backend(format!("cache task failed: {}", e)))?
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(
        state.cache.is_enabled(),
        state.cache.circuit_breaker().state(),
        state.cache.is_persistence_active(),
    ))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.cache.stats())
}

/// Handler for GET /keys
///
/// Lists live keys, optionally filtered by `?pattern=`.
pub async fn keys_handler(
    State(state): State<AppState>,
    Query(query): Query<KeysQuery>,
) -> Result<Json<KeysResponse>> {
    if let Some(glob) = &query.pattern {
        validate_pattern(glob)?;
    }
    let mut keys = with_cache(&state, |cache| Ok(cache.keys())).await?;
    if let Some(glob) = query.pattern {
        keys.retain(|key| pattern::matches(&glob, key));
    }
    Ok(Json(KeysResponse::new(keys)))
}

/// Handler for DELETE /invalidate/:pattern
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(glob): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    validate_pattern(&glob)?;
    let target = glob.clone();
    let removed = with_cache(&state, move |cache| cache.invalidate(&target)).await?;
    Ok(Json(InvalidateResponse {
        pattern: glob,
        removed,
    }))
}

/// Handler for POST /invalidate/operation
pub async fn invalidate_operation_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateOperationRequest>,
) -> Result<Json<OperationInvalidationResponse>> {
    let patterns = state.cache.invalidation_engine().patterns_for(
        req.operation,
        req.resource_type,
        req.resource_id.as_deref(),
        &req.context,
    );
    let removed = with_cache(&state, move |cache| {
        Ok(cache.invalidate_for_operation(
            req.operation,
            req.resource_type,
            req.resource_id.as_deref(),
            &req.context,
        ))
    })
    .await?;
    Ok(Json(OperationInvalidationResponse { patterns, removed }))
}

/// Handler for DELETE /clear
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    with_cache(&state, |cache| {
        cache.clear();
        Ok(())
    })
    .await?;
    Ok(Json(ClearResponse::new()))
}

/// Handler for GET /rules/validate
pub async fn rules_validate_handler(
    State(state): State<AppState>,
) -> Json<RulesValidationResponse> {
    let report = state.cache.invalidation_engine().validate_patterns();
    Json(RulesValidationResponse {
        valid: report.is_valid(),
        checked: report.checked,
        errors: report.errors,
    })
}
