//! Cache Key Builder
//!
//! Deterministic, length-bounded keys of the form
//! `resource_type:operation[:identifier[:sub_identifier[:params_hash]]]`.
//!
//! Each segment only contains `[A-Za-z0-9_-]`. When a parameter hash is
//! present every position is emitted, with `_` standing in for a missing
//! identifier, so a parsed key never confuses a hash with an identifier.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

// == Constants ==
/// Maximum total key length in characters
pub const MAX_KEY_LENGTH: usize = 250;

/// Identifier segments longer than this are truncated and suffixed with a hash
pub const MAX_SEGMENT_LENGTH: usize = 64;

/// Segment separator
pub const SEPARATOR: char = ':';

/// Placeholder for an absent identifier in a fully-positional key
pub const EMPTY_SEGMENT: &str = "_";

/// Hex characters kept from the parameter digest
const PARAMS_HASH_LEN: usize = 16;

/// Hex characters appended to truncated or rewritten identifiers
const SEGMENT_HASH_LEN: usize = 8;

/// Operations accepted in the second key segment.
pub const ALLOWED_OPERATIONS: &[&str] = &[
    "list", "describe", "get", "search", "members", "memberships", "lookup", "status",
];

// == Resource Type ==
/// Kinds of directory resources that get cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    Group,
    PermissionSet,
    Assignment,
    Account,
    Organization,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::User,
        ResourceType::Group,
        ResourceType::PermissionSet,
        ResourceType::Assignment,
        ResourceType::Account,
        ResourceType::Organization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::User => "user",
            ResourceType::Group => "group",
            ResourceType::PermissionSet => "permission_set",
            ResourceType::Assignment => "assignment",
            ResourceType::Account => "account",
            ResourceType::Organization => "organization",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceType::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| CacheError::InvalidKey(format!("unknown resource type '{}'", s)))
    }
}

// == Parsed Key ==
/// Components recovered from a key by [`parse_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedKey {
    pub resource_type: String,
    pub operation: String,
    pub identifier: Option<String>,
    pub sub_identifier: Option<String>,
    pub params_hash: Option<String>,
}

// == Build ==
/// Builds a cache key.
///
/// # Arguments
/// * `resource_type` - One of the [`ResourceType`] names
/// * `operation` - One of [`ALLOWED_OPERATIONS`]
/// * `identifier` - Primary resource identifier, sanitized
/// * `sub_identifier` - Secondary identifier, sanitized; requires `identifier`
/// * `params` - Extra parameters; hashed order-independently into the last segment
///
/// Fails with [`CacheError::InvalidKey`] for an unknown resource type or
/// operation, or when the result would exceed [`MAX_KEY_LENGTH`].
pub fn build_key(
    resource_type: &str,
    operation: &str,
    identifier: Option<&str>,
    sub_identifier: Option<&str>,
    params: Option<&Map<String, Value>>,
) -> Result<String> {
    if resource_type.is_empty() || operation.is_empty() {
        return Err(CacheError::InvalidKey(
            "resource type and operation are required".to_string(),
        ));
    }
    resource_type.parse::<ResourceType>()?;
    if !ALLOWED_OPERATIONS.contains(&operation) {
        return Err(CacheError::InvalidKey(format!(
            "unknown operation '{}'",
            operation
        )));
    }

    let identifier = identifier.filter(|s| !s.trim().is_empty()).map(normalize_identifier);
    let sub_identifier = sub_identifier
        .filter(|s| !s.trim().is_empty())
        .map(normalize_identifier);
    if identifier.is_none() && sub_identifier.is_some() {
        return Err(CacheError::InvalidKey(
            "sub identifier given without identifier".to_string(),
        ));
    }
    let params_hash = params.filter(|p| !p.is_empty()).map(hash_params);

    let mut segments = vec![resource_type.to_string(), operation.to_string()];
    match (identifier, sub_identifier, params_hash) {
        (id, sub, Some(hash)) => {
            segments.push(id.unwrap_or_else(|| EMPTY_SEGMENT.to_string()));
            segments.push(sub.unwrap_or_else(|| EMPTY_SEGMENT.to_string()));
            segments.push(hash);
        }
        (Some(id), sub, None) => {
            segments.push(id);
            segments.extend(sub);
        }
        (None, _, None) => {}
    }

    let key = segments.join(":");
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        )));
    }
    Ok(key)
}

// == Parse ==
/// Splits a key back into its components. Absent segments are `None`.
pub fn parse_key(key: &str) -> Result<ParsedKey> {
    validate_key(key)?;
    let segments: Vec<&str> = key.split(SEPARATOR).collect();
    if segments.len() < 2 || segments.len() > 5 || segments.iter().any(|s| s.is_empty()) {
        return Err(CacheError::InvalidKey(format!("malformed key '{}'", key)));
    }

    let present = |idx: usize| {
        segments
            .get(idx)
            .filter(|s| **s != EMPTY_SEGMENT)
            .map(|s| s.to_string())
    };

    Ok(ParsedKey {
        resource_type: segments[0].to_string(),
        operation: segments[1].to_string(),
        identifier: present(2),
        sub_identifier: present(3),
        params_hash: present(4),
    })
}

// == Validation ==
/// Checks that `key` is a usable concrete key.
pub fn validate_key(key: &str) -> Result<()> {
    validate_chars(key, false)
}

/// Checks that `pattern` is a usable invalidation pattern (`*` allowed).
pub fn validate_pattern(pattern: &str) -> Result<()> {
    validate_chars(pattern, true)
}

fn validate_chars(text: &str, allow_wildcard: bool) -> Result<()> {
    if text.trim().is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    if text.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        )));
    }
    let valid = text.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || c == '_'
            || c == '-'
            || c == SEPARATOR
            || (allow_wildcard && c == '*')
    });
    if !valid {
        return Err(CacheError::InvalidKey(format!(
            "key '{}' contains invalid characters",
            text
        )));
    }
    Ok(())
}

// == Segment Helpers ==
/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_segment(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Turns a raw identifier into its key segment.
///
/// Identifiers that sanitization had to rewrite, or that are longer than
/// [`MAX_SEGMENT_LENGTH`], keep a readable prefix followed by a hash of the
/// raw value, so `a/b` and `a_b` stay distinct. A bare `_` is rewritten too,
/// since it marks an absent segment.
pub fn normalize_identifier(raw: &str) -> String {
    let raw = raw.trim();
    let sanitized = sanitize_segment(raw);
    if sanitized == raw && sanitized != EMPTY_SEGMENT && sanitized.len() <= MAX_SEGMENT_LENGTH {
        return sanitized;
    }

    let keep = MAX_SEGMENT_LENGTH - SEGMENT_HASH_LEN - 1;
    let prefix: String = sanitized.chars().take(keep).collect();
    format!("{}_{}", prefix, short_hash(raw, SEGMENT_HASH_LEN))
}

/// Stable hash of a parameter set; insertion order does not matter.
pub fn hash_params(params: &Map<String, Value>) -> String {
    let sorted: BTreeMap<&str, &Value> = params.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let canonical = serde_json::to_string(&sorted).unwrap_or_default();
    short_hash(&canonical, PARAMS_HASH_LEN)
}

fn short_hash(text: &str, len: usize) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(len);
    encoded
}

/// Trailing path segment of a hierarchical identifier such as
/// `arn:aws:sso:::permissionSet/ssoins-1/ps-abc` (gives `ps-abc`).
pub fn permission_set_id(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

// == Convenience Builders ==
/// Key for a user read.
pub fn user_key(
    operation: &str,
    user_id: Option<&str>,
    params: Option<&Map<String, Value>>,
) -> Result<String> {
    build_key(ResourceType::User.as_str(), operation, user_id, None, params)
}

/// Key for a group read.
pub fn group_key(
    operation: &str,
    group_id: Option<&str>,
    params: Option<&Map<String, Value>>,
) -> Result<String> {
    build_key(ResourceType::Group.as_str(), operation, group_id, None, params)
}

/// Key for a group membership listing.
pub fn group_members_key(group_id: &str, params: Option<&Map<String, Value>>) -> Result<String> {
    build_key(ResourceType::Group.as_str(), "members", Some(group_id), None, params)
}

/// Key for a permission set read. Only the trailing segment of the ARN is
/// used, so callers passing the full ARN or the bare id share entries.
pub fn permission_set_key(
    operation: &str,
    permission_set: Option<&str>,
    params: Option<&Map<String, Value>>,
) -> Result<String> {
    build_key(
        ResourceType::PermissionSet.as_str(),
        operation,
        permission_set.map(permission_set_id),
        None,
        params,
    )
}

/// Key for an account assignment read, scoped by account then permission set.
pub fn assignment_key(
    operation: &str,
    account_id: Option<&str>,
    permission_set: Option<&str>,
    params: Option<&Map<String, Value>>,
) -> Result<String> {
    build_key(
        ResourceType::Assignment.as_str(),
        operation,
        account_id,
        permission_set.map(permission_set_id),
        params,
    )
}

/// Key for an account read.
pub fn account_key(
    operation: &str,
    account_id: Option<&str>,
    params: Option<&Map<String, Value>>,
) -> Result<String> {
    build_key(ResourceType::Account.as_str(), operation, account_id, None, params)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_build_simple_keys() {
        assert_eq!(build_key("user", "list", None, None, None).unwrap(), "user:list");
        assert_eq!(
            build_key("user", "describe", Some("u-123"), None, None).unwrap(),
            "user:describe:u-123"
        );
        assert_eq!(
            build_key("group", "members", Some("g1"), Some("m1"), None).unwrap(),
            "group:members:g1:m1"
        );
    }

    #[test]
    fn test_build_rejects_unknown_parts() {
        assert!(matches!(
            build_key("", "list", None, None, None),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(build_key("widget", "list", None, None, None).is_err());
        assert!(build_key("user", "explode", None, None, None).is_err());
        assert!(build_key("user", "list", None, Some("x"), None).is_err());
    }

    #[test]
    fn test_params_are_order_independent() {
        let mut a = Map::new();
        a.insert("Filter".to_string(), json!("name"));
        a.insert("Region".to_string(), json!("eu-west-1"));
        let mut b = Map::new();
        b.insert("Region".to_string(), json!("eu-west-1"));
        b.insert("Filter".to_string(), json!("name"));

        let key_a = build_key("user", "list", None, None, Some(&a)).unwrap();
        let key_b = build_key("user", "list", None, None, Some(&b)).unwrap();
        assert_eq!(key_a, key_b);

        let c = params(json!({"Filter": "other", "Region": "eu-west-1"}));
        let key_c = build_key("user", "list", None, None, Some(&c)).unwrap();
        assert_ne!(key_a, key_c);
    }

    #[test]
    fn test_params_key_is_fully_positional() {
        let p = params(json!({"Filter": "x"}));
        let key = build_key("user", "list", None, None, Some(&p)).unwrap();
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[2], EMPTY_SEGMENT);
        assert_eq!(parts[3], EMPTY_SEGMENT);
        assert_eq!(parts[4].len(), 16);
    }

    #[test]
    fn test_empty_params_add_no_segment() {
        let empty = Map::new();
        assert_eq!(
            build_key("user", "list", None, None, Some(&empty)).unwrap(),
            "user:list"
        );
    }

    #[test]
    fn test_identifiers_are_sanitized_and_stay_distinct() {
        let slash = build_key("user", "describe", Some("a/b"), None, None).unwrap();
        let underscore = build_key("user", "describe", Some("a_b"), None, None).unwrap();
        assert_ne!(slash, underscore);
        assert!(slash.starts_with("user:describe:a_b_"));
        assert!(validate_key(&slash).is_ok());
    }

    #[test]
    fn test_placeholder_identifier_is_rewritten() {
        let key = build_key("user", "describe", Some("_"), None, None).unwrap();
        assert!(parse_key(&key).unwrap().identifier.is_some());
    }

    #[test]
    fn test_long_identifier_is_truncated_with_hash() {
        let long_a = "a".repeat(300);
        let mut long_b = "a".repeat(299);
        long_b.push('b');

        let key_a = build_key("user", "describe", Some(&long_a), None, None).unwrap();
        let key_b = build_key("user", "describe", Some(&long_b), None, None).unwrap();

        assert!(key_a.len() <= MAX_KEY_LENGTH);
        assert_ne!(key_a, key_b);
        let segment = key_a.rsplit(':').next().unwrap();
        assert_eq!(segment.len(), MAX_SEGMENT_LENGTH);
    }

    #[test]
    fn test_parse_key_roundtrip_components() {
        let parsed = parse_key("group:members:g1:m1").unwrap();
        assert_eq!(parsed.resource_type, "group");
        assert_eq!(parsed.operation, "members");
        assert_eq!(parsed.identifier.as_deref(), Some("g1"));
        assert_eq!(parsed.sub_identifier.as_deref(), Some("m1"));
        assert!(parsed.params_hash.is_none());

        let parsed = parse_key("user:list").unwrap();
        assert!(parsed.identifier.is_none());
        assert!(parsed.sub_identifier.is_none());
    }

    #[test]
    fn test_parse_key_with_params_hash() {
        let p = params(json!({"Filter": "x"}));
        let key = build_key("user", "list", Some("all"), None, Some(&p)).unwrap();
        let parsed = parse_key(&key).unwrap();
        assert_eq!(parsed.identifier.as_deref(), Some("all"));
        assert!(parsed.sub_identifier.is_none());
        assert_eq!(parsed.params_hash, Some(hash_params(&p)));
    }

    #[test]
    fn test_parse_key_rejects_malformed() {
        assert!(parse_key("").is_err());
        assert!(parse_key("user").is_err());
        assert!(parse_key("user::x").is_err());
        assert!(parse_key("a:b:c:d:e:f").is_err());
        assert!(parse_key("user:list:bad key").is_err());
    }

    #[test]
    fn test_validate_pattern_allows_wildcard_only_in_patterns() {
        assert!(validate_pattern("user:*").is_ok());
        assert!(validate_key("user:*").is_err());
        assert!(validate_pattern("   ").is_err());
    }

    #[test]
    fn test_permission_set_key_uses_trailing_segment() {
        let full = permission_set_key(
            "describe",
            Some("arn:aws:sso:::permissionSet/ssoins-1111/ps-abc123"),
            None,
        )
        .unwrap();
        let bare = permission_set_key("describe", Some("ps-abc123"), None).unwrap();
        assert_eq!(full, bare);
        assert_eq!(bare, "permission_set:describe:ps-abc123");
    }

    #[test]
    fn test_assignment_and_account_keys() {
        let key = assignment_key(
            "list",
            Some("123456789012"),
            Some("arn:aws:sso:::permissionSet/ssoins-1/ps-9"),
            None,
        )
        .unwrap();
        assert_eq!(key, "assignment:list:123456789012:ps-9");
        assert_eq!(
            account_key("describe", Some("123456789012"), None).unwrap(),
            "account:describe:123456789012"
        );
        assert_eq!(group_members_key("g-1", None).unwrap(), "group:members:g-1");
        assert_eq!(user_key("list", None, None).unwrap(), "user:list");
        assert_eq!(group_key("describe", Some("g-1"), None).unwrap(), "group:describe:g-1");
    }

    #[test]
    fn test_resource_type_from_str() {
        assert_eq!("permission_set".parse::<ResourceType>().unwrap(), ResourceType::PermissionSet);
        assert!("PermissionSet".parse::<ResourceType>().is_err());
    }
}
