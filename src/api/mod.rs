//! API Module
//!
//! Admin and monitoring HTTP surface over the shared cache manager.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Get cache statistics
//! - `GET /keys` - List live keys
//! - `DELETE /invalidate/:pattern` - Invalidate by glob
//! - `POST /invalidate/operation` - Invalidate for a write
//! - `DELETE /clear` - Clear the cache
//! - `GET /rules/validate` - Validate invalidation rules

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
