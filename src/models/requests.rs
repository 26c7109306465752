//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use crate::invalidation::{InvalidationContext, OperationType};
use crate::keys::ResourceType;

/// Request body for `POST /invalidate/operation`
///
/// Replays the invalidation a write would trigger, for operators fixing up
/// after changes made outside this client.
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateOperationRequest {
    pub operation: OperationType,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub context: InvalidationContext,
}

/// Query string for `GET /keys`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysQuery {
    /// Glob filter; all keys when absent
    #[serde(default)]
    pub pattern: Option<String>,
}
