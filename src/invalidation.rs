//! Invalidation Engine
//!
//! Maps a write (operation type, resource type, resource id, context) to the
//! key patterns that may now hold stale data. Patterns come from a static
//! rule table plus cross-resource rules: a user change affects group
//! membership listings, a permission set change affects assignments, and
//! so on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CacheError, Result};
use crate::keys::{normalize_identifier, permission_set_id, validate_pattern, ResourceType};

/// Placeholders templates may use. Anything else is a rule-table bug.
pub const KNOWN_PLACEHOLDERS: &[&str] = &[
    "resource_type",
    "resource_id",
    "account_id",
    "principal_id",
    "principal_type",
    "permission_set_id",
    "member_id",
];

// == Operation Type ==
/// Kind of write that triggers invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    AddMember,
    RemoveMember,
    Provision,
}

impl OperationType {
    pub const ALL: [OperationType; 6] = [
        OperationType::Create,
        OperationType::Update,
        OperationType::Delete,
        OperationType::AddMember,
        OperationType::RemoveMember,
        OperationType::Provision,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::AddMember => "add_member",
            OperationType::RemoveMember => "remove_member",
            OperationType::Provision => "provision",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        OperationType::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| CacheError::InvalidKey(format!("unknown operation type '{}'", s)))
    }
}

// == Invalidation Context ==
/// Extra facts about a write, used to fill templates and narrow patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationContext {
    #[serde(default)]
    values: BTreeMap<String, String>,
    #[serde(default)]
    member_ids: Vec<String>,
}

impl InvalidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a placeholder value such as `account_id`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Records members affected by a membership change.
    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.member_ids.extend(members.into_iter().map(Into::into));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn member_ids(&self) -> &[String] {
        &self.member_ids
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.member_ids.is_empty()
    }
}

// == Validation Report ==
/// Result of [`InvalidationEngine::validate_patterns`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Templates examined
    pub checked: usize,
    /// One message per broken template
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// == Invalidation Engine ==
/// Rule-driven, stateless once built; safe to share between threads.
#[derive(Debug, Clone)]
pub struct InvalidationEngine {
    rules: HashMap<(ResourceType, OperationType), Vec<&'static str>>,
}

impl Default for InvalidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationEngine {
    /// Builds the engine with the standard rule table.
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    /// Builds the engine with a custom rule table.
    pub fn with_rules(rules: HashMap<(ResourceType, OperationType), Vec<&'static str>>) -> Self {
        Self { rules }
    }

    /// Templates registered for a resource/operation pair.
    pub fn templates(&self, resource: ResourceType, operation: OperationType) -> &[&'static str] {
        self.rules
            .get(&(resource, operation))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every pattern a write invalidates, deduplicated in first-seen order.
    pub fn patterns_for(
        &self,
        operation: OperationType,
        resource: ResourceType,
        resource_id: Option<&str>,
        context: &InvalidationContext,
    ) -> Vec<String> {
        let resource_id = resource_id.filter(|id| !id.trim().is_empty());

        let mut patterns: Vec<String> = self
            .templates(resource, operation)
            .iter()
            .map(|template| format_template(template, resource, resource_id, context))
            .collect();
        patterns.extend(cross_resource_patterns(
            operation,
            resource,
            resource_id,
            context,
        ));

        let mut seen = HashSet::new();
        patterns.retain(|p| seen.insert(p.clone()));
        patterns
    }

    /// Applies every pattern for a write through `invalidate`, returning the
    /// total number of entries removed.
    ///
    /// Not transactional: patterns are applied one at a time.
    pub fn invalidate_for_operation<F>(
        &self,
        operation: OperationType,
        resource: ResourceType,
        resource_id: Option<&str>,
        context: &InvalidationContext,
        mut invalidate: F,
    ) -> usize
    where
        F: FnMut(&str) -> usize,
    {
        let patterns = self.patterns_for(operation, resource, resource_id, context);
        let mut removed = 0;
        for pattern in &patterns {
            let count = invalidate(pattern);
            debug!(pattern = %pattern, removed = count, "Applied invalidation pattern");
            removed += count;
        }

        info!(
            operation = %operation,
            resource_type = %resource,
            resource_id = resource_id.unwrap_or("*"),
            patterns = patterns.len(),
            removed,
            "Invalidated cache for write"
        );
        removed
    }

    /// Load-time self-check: every template only uses known placeholders and
    /// formats into a valid pattern.
    pub fn validate_patterns(&self) -> ValidationReport {
        let sample = InvalidationContext::new()
            .with("account_id", "123456789012")
            .with("principal_id", "sample-principal")
            .with("principal_type", "USER")
            .with("permission_set_id", "ps-sample")
            .with("member_id", "sample-member");

        let mut report = ValidationReport::default();
        let mut keys: Vec<_> = self.rules.keys().copied().collect();
        keys.sort_by_key(|(r, o)| (r.as_str(), o.as_str()));

        for (resource, operation) in keys {
            for template in self.templates(resource, operation) {
                report.checked += 1;
                if let Err(msg) = check_placeholders(template) {
                    report
                        .errors
                        .push(format!("{}/{}: '{}': {}", resource, operation, template, msg));
                    continue;
                }
                let formatted = format_template(template, resource, Some("sample-id"), &sample);
                if let Err(e) = validate_pattern(&formatted) {
                    report
                        .errors
                        .push(format!("{}/{}: '{}': {}", resource, operation, template, e));
                }
            }
        }
        report
    }
}

// == Template Formatting ==
/// Fills `{placeholder}`s. Missing values become `*`, which only widens
/// the pattern.
fn format_template(
    template: &str,
    resource: ResourceType,
    resource_id: Option<&str>,
    context: &InvalidationContext,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        let value = match name {
            "resource_type" => resource.as_str().to_string(),
            "resource_id" => resource_id
                .map(|id| segment_for(resource, id))
                .unwrap_or_else(|| "*".to_string()),
            "permission_set_id" => context
                .get(name)
                .map(|v| normalize_identifier(permission_set_id(v)))
                .unwrap_or_else(|| "*".to_string()),
            other => context
                .get(other)
                .map(normalize_identifier)
                .unwrap_or_else(|| "*".to_string()),
        };
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Key segment a resource id occupies, mirroring the key builders.
fn segment_for(resource: ResourceType, id: &str) -> String {
    match resource {
        ResourceType::PermissionSet => normalize_identifier(permission_set_id(id)),
        _ => normalize_identifier(id),
    }
}

fn check_placeholders(template: &str) -> std::result::Result<(), String> {
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| "unterminated placeholder".to_string())?;
        let name = &after[..end];
        if !KNOWN_PLACEHOLDERS.contains(&name) {
            return Err(format!("unknown placeholder '{{{}}}'", name));
        }
        rest = &after[end + 1..];
    }
    if rest.contains('}') {
        return Err("stray closing brace".to_string());
    }
    Ok(())
}

/// Exact key plus everything below it: `p` and `p:*`.
fn subtree(prefix: String) -> [String; 2] {
    let nested = format!("{}:*", prefix);
    [prefix, nested]
}

// == Cross-Resource Rules ==
fn cross_resource_patterns(
    operation: OperationType,
    resource: ResourceType,
    resource_id: Option<&str>,
    context: &InvalidationContext,
) -> Vec<String> {
    use OperationType::*;
    use ResourceType::*;

    let mut patterns = Vec::new();
    match (resource, operation) {
        // A user may appear in any membership listing or assignment
        (User, Update) | (User, Delete) => {
            patterns.push("group:members:*".to_string());
            match resource_id {
                Some(user_id) => patterns.extend(subtree(format!(
                    "group:memberships:{}",
                    normalize_identifier(user_id)
                ))),
                None => patterns.push("group:memberships:*".to_string()),
            }
            patterns.push("assignment:*".to_string());
        }
        (Group, AddMember) | (Group, RemoveMember) => {
            if let Some(group_id) = resource_id {
                patterns.extend(subtree(format!(
                    "group:members:{}",
                    normalize_identifier(group_id)
                )));
            }
            for member in context.member_ids() {
                let member = normalize_identifier(member);
                patterns.extend(subtree(format!("user:describe:{}", member)));
                patterns.extend(subtree(format!("user:get:{}", member)));
                patterns.extend(subtree(format!("group:memberships:{}", member)));
            }
            if context.member_ids().is_empty() {
                patterns.push("group:memberships:*".to_string());
            }
        }
        // A deleted group disappears from assignments and from the
        // membership listings of its former members
        (Group, Delete) => {
            patterns.push("group:memberships:*".to_string());
            patterns.push("assignment:*".to_string());
        }
        (PermissionSet, Update) | (PermissionSet, Delete) | (PermissionSet, Provision) => {
            match context.get("account_id") {
                Some(account) => {
                    let account = normalize_identifier(account);
                    patterns.extend(subtree(format!("assignment:*:{}", account)));
                }
                None => patterns.push("assignment:*".to_string()),
            }
        }
        // Assigning also provisions the permission set to the account
        (Assignment, Create) | (Assignment, Delete) => {
            patterns.push("assignment:list*".to_string());
            match context.get("permission_set_id") {
                Some(arn) => patterns.extend(subtree(format!(
                    "permission_set:list:{}",
                    normalize_identifier(permission_set_id(arn))
                ))),
                None => patterns.push("permission_set:list:*".to_string()),
            }
            let principal = context.get("principal_id").map(normalize_identifier);
            let principal_type = context.get("principal_type").map(str::to_ascii_uppercase);
            match (principal_type.as_deref(), principal) {
                (Some("USER"), Some(id)) => {
                    patterns.extend(subtree(format!("user:describe:{}", id)));
                }
                (Some("GROUP"), Some(id)) => {
                    patterns.extend(subtree(format!("group:describe:{}", id)));
                    patterns.extend(subtree(format!("group:members:{}", id)));
                }
                _ => {}
            }
        }
        _ => {}
    }
    patterns
}

// == Rule Table ==
/// The standard rule table.
pub fn default_rules() -> HashMap<(ResourceType, OperationType), Vec<&'static str>> {
    use OperationType::*;
    use ResourceType::*;

    const LISTINGS: [&str; 2] = ["{resource_type}:list*", "{resource_type}:search*"];
    const DETAIL: [&str; 4] = [
        "{resource_type}:describe:{resource_id}",
        "{resource_type}:describe:{resource_id}:*",
        "{resource_type}:get:{resource_id}",
        "{resource_type}:get:{resource_id}:*",
    ];

    // Name lookups carry no identifier, so any change may affect them
    const LOOKUPS: &str = "{resource_type}:get:_:*";

    let listings_and_detail: Vec<&'static str> =
        LISTINGS.iter().chain(DETAIL.iter()).copied().collect();
    let mut with_lookups = listings_and_detail.clone();
    with_lookups.push(LOOKUPS);

    let mut rules = HashMap::new();

    rules.insert((User, Create), LISTINGS.to_vec());
    rules.insert((User, Update), with_lookups.clone());
    rules.insert((User, Delete), with_lookups.clone());

    rules.insert((Group, Create), LISTINGS.to_vec());
    rules.insert((Group, Update), with_lookups.clone());
    let mut group_delete = with_lookups;
    group_delete.extend([
        "group:members:{resource_id}",
        "group:members:{resource_id}:*",
    ]);
    rules.insert((Group, Delete), group_delete);
    rules.insert(
        (Group, AddMember),
        vec!["group:members:{resource_id}", "group:members:{resource_id}:*"],
    );
    rules.insert(
        (Group, RemoveMember),
        vec!["group:members:{resource_id}", "group:members:{resource_id}:*"],
    );

    rules.insert((PermissionSet, Create), LISTINGS.to_vec());
    rules.insert((PermissionSet, Update), listings_and_detail.clone());
    rules.insert((PermissionSet, Delete), listings_and_detail.clone());
    rules.insert(
        (PermissionSet, Provision),
        vec![
            "{resource_type}:status*",
            "{resource_type}:describe:{resource_id}",
            "{resource_type}:describe:{resource_id}:*",
            "{resource_type}:list:{resource_id}",
            "{resource_type}:list:{resource_id}:*",
        ],
    );

    rules.insert(
        (Assignment, Create),
        vec!["{resource_type}:*:{account_id}", "{resource_type}:*:{account_id}:*"],
    );
    rules.insert(
        (Assignment, Delete),
        vec!["{resource_type}:*:{account_id}", "{resource_type}:*:{account_id}:*"],
    );

    rules.insert((Account, Create), LISTINGS.to_vec());
    rules.insert((Account, Update), listings_and_detail.clone());
    rules.insert((Account, Delete), listings_and_detail.clone());

    rules.insert((Organization, Update), listings_and_detail);

    rules
}
