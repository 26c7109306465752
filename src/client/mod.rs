//! Remote Client Module
//!
//! Caching in front of the identity service client. Methods follow a naming
//! convention: `list_`/`describe_`/`get_` read, `create_`/`update_`/
//! `delete_`/`put_`/`attach_`/`detach_`/`provision_` write. Reads go through
//! the cache, writes invalidate it, everything else passes straight through.

mod adapters;
mod wrapper;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::invalidation::OperationType;
use crate::keys::ResourceType;

pub use adapters::{AssignmentRequest, IdentityStoreOps, PrincipalType, SsoAdminOps};
pub use wrapper::CachedClientWrapper;

// == Naming Convention ==
/// Read methods recognised regardless of prefix.
pub const READ_METHODS: &[&str] = &[
    "list_users",
    "list_groups",
    "list_group_memberships",
    "list_group_memberships_for_member",
    "describe_user",
    "describe_group",
    "describe_group_membership",
    "get_user_id",
    "get_group_id",
    "get_group_membership_id",
    "list_permission_sets",
    "describe_permission_set",
    "describe_permission_set_provisioning_status",
    "list_account_assignments",
    "list_accounts_for_provisioned_permission_set",
    "list_accounts",
    "describe_account",
    "describe_organization",
];

/// Write methods recognised regardless of prefix.
pub const WRITE_METHODS: &[&str] = &[
    "create_user",
    "update_user",
    "delete_user",
    "create_group",
    "update_group",
    "delete_group",
    "create_group_membership",
    "delete_group_membership",
    "create_permission_set",
    "update_permission_set",
    "delete_permission_set",
    "provision_permission_set",
    "put_inline_policy_to_permission_set",
    "attach_managed_policy_to_permission_set",
    "detach_managed_policy_from_permission_set",
    "create_account_assignment",
    "delete_account_assignment",
];

/// Client helpers that look like reads but must never be cached.
pub const PASSTHROUGH_METHODS: &[&str] = &["get_paginator", "can_paginate", "get_waiter"];

const READ_PREFIXES: &[&str] = &["list_", "describe_", "get_"];
const WRITE_PREFIXES: &[&str] = &[
    "create_",
    "update_",
    "delete_",
    "put_",
    "attach_",
    "detach_",
    "provision_",
];

/// Argument names that only page through results.
pub const PAGINATION_ARGS: &[&str] = &["NextToken", "next_token", "MaxResults", "max_results"];
const CONTINUATION_ARGS: &[&str] = &["NextToken", "next_token"];

// == Method Kind ==
/// Read families; each gets its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFamily {
    List,
    Describe,
    Get,
}

impl ReadFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadFamily::List => "list",
            ReadFamily::Describe => "describe",
            ReadFamily::Get => "get",
        }
    }
}

/// How a method call is treated by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Read(ReadFamily),
    Write(OperationType),
    Passthrough,
}

/// Classifies a method by name.
pub fn classify(method: &str) -> MethodKind {
    if PASSTHROUGH_METHODS.contains(&method) {
        return MethodKind::Passthrough;
    }

    let is_read = READ_METHODS.contains(&method) || has_prefix(method, READ_PREFIXES);
    if is_read {
        let family = if method.starts_with("list_") {
            ReadFamily::List
        } else if method.starts_with("describe_") {
            ReadFamily::Describe
        } else {
            ReadFamily::Get
        };
        return MethodKind::Read(family);
    }

    let is_write = WRITE_METHODS.contains(&method) || has_prefix(method, WRITE_PREFIXES);
    if is_write {
        return MethodKind::Write(write_operation(method));
    }

    MethodKind::Passthrough
}

fn has_prefix(method: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| method.starts_with(p) && method.len() > p.len())
}

fn write_operation(method: &str) -> OperationType {
    match method {
        "create_group_membership" => OperationType::AddMember,
        "delete_group_membership" => OperationType::RemoveMember,
        m if m.starts_with("create_") => OperationType::Create,
        m if m.starts_with("delete_") => OperationType::Delete,
        m if m.starts_with("provision_") => OperationType::Provision,
        _ => OperationType::Update,
    }
}

/// Resource a method acts on, judged from its name.
pub fn infer_resource(method: &str) -> Option<ResourceType> {
    if method.contains("assignment") {
        Some(ResourceType::Assignment)
    } else if method.contains("permission_set") {
        Some(ResourceType::PermissionSet)
    } else if method.contains("group") {
        Some(ResourceType::Group)
    } else if method.contains("user") {
        Some(ResourceType::User)
    } else if method.contains("account") {
        Some(ResourceType::Account)
    } else if method.contains("organization") {
        Some(ResourceType::Organization)
    } else {
        None
    }
}

/// Key operation segment for a read; membership listings and provisioning
/// status get their own operation so invalidation can target them.
///
/// Listings by member are keyed under `memberships`, by group under `members`.
pub fn read_operation(method: &str, family: ReadFamily) -> &'static str {
    if method.contains("memberships_for_member") {
        "memberships"
    } else if method.contains("group_membership") {
        "members"
    } else if method.contains("provisioning_status") {
        "status"
    } else {
        family.as_str()
    }
}

// == Call Arguments ==
/// Named and positional arguments of one remote call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    named: Map<String, Value>,
    positional: Vec<Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named argument.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Adds a named argument only when present.
    pub fn with_opt(self, name: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    /// Appends a positional argument (legacy call style).
    pub fn with_positional(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn named(&self) -> &Map<String, Value> {
        &self.named
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    /// First of `names` holding a usable identifier string.
    ///
    /// Accepts a plain string, or an object such as `{"UserId": "u1"}`
    /// wrapping one. Anything else counts as absent.
    pub fn find_str(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.named.get(*name))
            .find_map(identifier_value)
    }

    /// Whether this call asks for a later page.
    pub fn is_continuation(&self) -> bool {
        CONTINUATION_ARGS
            .iter()
            .any(|name| self.named.get(*name).is_some_and(|v| !v.is_null()))
    }
}

/// Identifier carried by a JSON value, if it carries exactly one string id.
fn identifier_value(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
        Value::Object(map) if map.len() == 1 => map.values().next().and_then(identifier_value),
        _ => None,
    }
}

// == Remote Client ==
/// A client of the remote identity service, driven by method name.
pub trait RemoteClient: Send + Sync {
    type Error;

    /// Invokes `method` on the remote service.
    fn invoke(&self, method: &str, args: &CallArgs) -> Result<Value, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_representative_methods() {
        assert_eq!(classify("list_users"), MethodKind::Read(ReadFamily::List));
        assert_eq!(classify("describe_group"), MethodKind::Read(ReadFamily::Describe));
        assert_eq!(classify("get_user_id"), MethodKind::Read(ReadFamily::Get));
        assert_eq!(classify("create_user"), MethodKind::Write(OperationType::Create));
        assert_eq!(classify("unknown_op"), MethodKind::Passthrough);
    }

    #[test]
    fn test_classify_write_operation_types() {
        assert_eq!(classify("update_user"), MethodKind::Write(OperationType::Update));
        assert_eq!(classify("delete_group"), MethodKind::Write(OperationType::Delete));
        assert_eq!(
            classify("create_group_membership"),
            MethodKind::Write(OperationType::AddMember)
        );
        assert_eq!(
            classify("delete_group_membership"),
            MethodKind::Write(OperationType::RemoveMember)
        );
        assert_eq!(
            classify("provision_permission_set"),
            MethodKind::Write(OperationType::Provision)
        );
        assert_eq!(
            classify("attach_managed_policy_to_permission_set"),
            MethodKind::Write(OperationType::Update)
        );
        assert_eq!(
            classify("put_inline_policy_to_permission_set"),
            MethodKind::Write(OperationType::Update)
        );
    }

    #[test]
    fn test_pagination_helpers_pass_through() {
        assert_eq!(classify("get_paginator"), MethodKind::Passthrough);
        assert_eq!(classify("can_paginate"), MethodKind::Passthrough);
        assert_eq!(classify("get_"), MethodKind::Passthrough);
    }

    #[test]
    fn test_infer_resource() {
        assert_eq!(infer_resource("list_users"), Some(ResourceType::User));
        assert_eq!(infer_resource("list_group_memberships"), Some(ResourceType::Group));
        assert_eq!(
            infer_resource("list_account_assignments"),
            Some(ResourceType::Assignment)
        );
        assert_eq!(
            infer_resource("describe_permission_set"),
            Some(ResourceType::PermissionSet)
        );
        assert_eq!(infer_resource("list_accounts"), Some(ResourceType::Account));
        assert_eq!(infer_resource("unknown_op"), None);
    }

    #[test]
    fn test_read_operation() {
        assert_eq!(read_operation("list_group_memberships", ReadFamily::List), "members");
        assert_eq!(
            read_operation("list_group_memberships_for_member", ReadFamily::List),
            "memberships"
        );
        assert_eq!(
            read_operation("describe_permission_set_provisioning_status", ReadFamily::Describe),
            "status"
        );
        assert_eq!(read_operation("list_users", ReadFamily::List), "list");
    }

    #[test]
    fn test_find_str_shapes() {
        let args = CallArgs::new()
            .with("UserId", json!(42))
            .with("MemberId", json!({"UserId": "u-9"}))
            .with("GroupId", "g-1");

        assert_eq!(args.find_str(&["UserId"]), None);
        assert_eq!(args.find_str(&["MemberId"]), Some("u-9"));
        assert_eq!(args.find_str(&["Missing", "GroupId"]), Some("g-1"));
    }

    #[test]
    fn test_is_continuation() {
        assert!(!CallArgs::new().with("MaxResults", 10).is_continuation());
        assert!(!CallArgs::new().with("NextToken", Value::Null).is_continuation());
        assert!(CallArgs::new().with("NextToken", "abc").is_continuation());
    }

    #[test]
    fn test_with_opt() {
        let args = CallArgs::new()
            .with_opt("NextToken", None::<&str>)
            .with_opt("MaxResults", Some(5));
        assert!(args.get("NextToken").is_none());
        assert_eq!(args.get("MaxResults"), Some(&json!(5)));
    }
}
