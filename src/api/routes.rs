//! API Routes
//!
//! Configures the Axum router with the cache admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, health_handler, invalidate_handler, invalidate_operation_handler,
    keys_handler, rules_validate_handler, stats_handler, AppState,
};

/// Creates the admin router.
///
/// # Endpoints
/// - `GET /health` - Cache and circuit breaker health
/// - `GET /stats` - Counters and hit rate
/// - `GET /keys` - Live keys, optional `?pattern=` glob filter
/// - `DELETE /invalidate/:pattern` - Remove keys matching a glob
/// - `POST /invalidate/operation` - Replay the invalidation for a write
/// - `DELETE /clear` - Remove everything
/// - `GET /rules/validate` - Check the invalidation rule table
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/keys", get(keys_handler))
        .route("/invalidate/operation", post(invalidate_operation_handler))
        .route("/invalidate/:pattern", delete(invalidate_handler))
        .route("/clear", delete(clear_handler))
        .route("/rules/validate", get(rules_validate_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
