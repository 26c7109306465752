//! Cached Client Wrapper
//!
//! Decorates a [`RemoteClient`] so reads are served from the shared
//! [`CacheManager`] and writes invalidate whatever they may have made stale.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use super::{
    classify, identifier_value, infer_resource, read_operation, CallArgs, MethodKind, ReadFamily,
    RemoteClient, PAGINATION_ARGS,
};
use crate::cache::CacheManager;
use crate::error::Result;
use crate::invalidation::{InvalidationContext, OperationType};
use crate::keys::{self, ResourceType};

/// Parameter entry recording the originating method
const METHOD_PARAM: &str = "_method";

/// Parameter entry holding positional arguments not used as identifiers
const POSITIONAL_PARAM: &str = "_args";

const USER_ARGS: &[&str] = &["UserId", "user_id"];
const GROUP_ARGS: &[&str] = &["GroupId", "group_id"];
const PERMISSION_SET_ARGS: &[&str] = &["PermissionSetArn", "permission_set_arn"];
const ACCOUNT_ARGS: &[&str] = &["AccountId", "TargetId", "account_id", "target_id"];
const ORGANIZATION_ARGS: &[&str] = &["OrganizationId", "organization_id"];
const PRINCIPAL_TYPE_ARGS: &[&str] = &["PrincipalType", "principal_type"];
const PRINCIPAL_ID_ARGS: &[&str] = &["PrincipalId", "principal_id"];
const MEMBER_ARGS: &[&str] = &["MemberId", "member_id"];
const NO_ARGS: &[&str] = &[];

/// Argument names carrying the primary and secondary identifier.
fn identifier_args(resource: ResourceType) -> (&'static [&'static str], &'static [&'static str]) {
    match resource {
        ResourceType::User => (USER_ARGS, NO_ARGS),
        ResourceType::Group => (GROUP_ARGS, NO_ARGS),
        ResourceType::PermissionSet => (PERMISSION_SET_ARGS, NO_ARGS),
        ResourceType::Assignment => (ACCOUNT_ARGS, PERMISSION_SET_ARGS),
        ResourceType::Account => (ACCOUNT_ARGS, NO_ARGS),
        ResourceType::Organization => (ORGANIZATION_ARGS, NO_ARGS),
    }
}

// == Cached Client Wrapper ==
/// Caching decorator around a remote client.
///
/// `resource_type` labels the client and is used whenever the method name
/// alone does not reveal the resource.
#[derive(Debug)]
pub struct CachedClientWrapper<C> {
    client: C,
    cache: Arc<CacheManager>,
    resource_type: ResourceType,
}

impl<C> CachedClientWrapper<C> {
    pub fn new(client: C, cache: Arc<CacheManager>, resource_type: ResourceType) -> Self {
        Self {
            client,
            cache,
            resource_type,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn into_inner(self) -> C {
        self.client
    }

    /// Runs one call through the cache, using `fetch` to reach the remote
    /// service.
    ///
    /// Reads are answered from the cache when possible and stored on a
    /// miss. Writes always run, then invalidate. Remote errors are returned
    /// unchanged and never cached.
    pub fn call_with<E, F>(
        &self,
        method: &str,
        args: &CallArgs,
        fetch: F,
    ) -> std::result::Result<Value, E>
    where
        F: FnOnce() -> std::result::Result<Value, E>,
    {
        let resource = infer_resource(method).unwrap_or(self.resource_type);
        match classify(method) {
            MethodKind::Read(family) => self.cached_read(method, family, resource, args, fetch),
            MethodKind::Write(operation) => {
                let result = fetch()?;
                let removed = self.invalidate_after_write(operation, resource, args);
                debug!(method, removed, "Write completed");
                Ok(result)
            }
            MethodKind::Passthrough => fetch(),
        }
    }

    fn cached_read<E, F>(
        &self,
        method: &str,
        family: ReadFamily,
        resource: ResourceType,
        args: &CallArgs,
        fetch: F,
    ) -> std::result::Result<Value, E>
    where
        F: FnOnce() -> std::result::Result<Value, E>,
    {
        let key = match read_key(method, family, resource, args) {
            Ok(key) => key,
            Err(e) => {
                debug!(method, error = %e, "Read not cacheable, calling remote");
                return fetch();
            }
        };

        if let Ok(Some(value)) = self.cache.get(&key) {
            return Ok(value);
        }

        let value = fetch()?;
        let ttl = self.ttl_for(method, family);
        if let Err(e) = self.cache.set(&key, value.clone(), Some(ttl)) {
            debug!(key = %key, error = %e, "Response not stored");
        }
        Ok(value)
    }

    fn ttl_for(&self, method: &str, family: ReadFamily) -> Duration {
        let config = self.cache.config();
        match (read_operation(method, family), family) {
            ("status", _) => config.default_ttl,
            (_, ReadFamily::List) => config.list_ttl,
            (_, ReadFamily::Describe | ReadFamily::Get) => config.describe_ttl,
        }
    }

    fn invalidate_after_write(
        &self,
        operation: OperationType,
        resource: ResourceType,
        args: &CallArgs,
    ) -> usize {
        let (primary, _) = identifier_args(resource);
        let resource_id = args
            .find_str(primary)
            .or_else(|| positional_str(args, 0));

        let mut context = InvalidationContext::new();
        let facts = [
            ("account_id", ACCOUNT_ARGS),
            ("permission_set_id", PERMISSION_SET_ARGS),
            ("principal_type", PRINCIPAL_TYPE_ARGS),
            ("principal_id", PRINCIPAL_ID_ARGS),
            ("member_id", MEMBER_ARGS),
        ];
        for (name, arg_names) in facts {
            if let Some(value) = args.find_str(arg_names) {
                context = context.with(name, value);
            }
        }
        if let Some(member) = args.find_str(MEMBER_ARGS) {
            context = context.with_members([member]);
        }

        self.cache
            .invalidate_for_operation(operation, resource, resource_id, &context)
    }
}

impl<C: RemoteClient> RemoteClient for CachedClientWrapper<C> {
    type Error = C::Error;

    fn invoke(&self, method: &str, args: &CallArgs) -> std::result::Result<Value, Self::Error> {
        self.call_with(method, args, || self.client.invoke(method, args))
    }
}

// == Key Derivation ==
/// Cache key for a read call.
///
/// Identifiers that are found become key segments; every other argument,
/// the method name and any unused positional arguments are hashed into the
/// params segment. Paging arguments only count on continuation pages.
fn read_key(
    method: &str,
    family: ReadFamily,
    resource: ResourceType,
    args: &CallArgs,
) -> Result<String> {
    let operation = read_operation(method, family);
    let (primary_names, secondary_names) = match operation {
        "memberships" => (MEMBER_ARGS, NO_ARGS),
        _ => identifier_args(resource),
    };

    let mut positional_used = 0;
    let primary = match find_named(args, primary_names) {
        Some(found) => Some(found),
        None => positional_str(args, 0).map(|id| {
            positional_used = 1;
            ("", id)
        }),
    };
    let secondary = match (&primary, secondary_names.is_empty()) {
        (None, _) | (_, true) => None,
        _ => match find_named(args, secondary_names) {
            Some(found) => Some(found),
            None if positional_used == 1 => positional_str(args, 1).map(|id| {
                positional_used = 2;
                ("", id)
            }),
            None => None,
        },
    };

    let used: Vec<&str> = [primary, secondary]
        .iter()
        .flatten()
        .map(|(name, _)| *name)
        .filter(|name| !name.is_empty())
        .collect();
    let keep_paging = args.is_continuation();

    let mut params: Map<String, Value> = args
        .named()
        .iter()
        .filter(|(name, _)| !used.contains(&name.as_str()))
        .filter(|(name, _)| keep_paging || !PAGINATION_ARGS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let extra: Vec<Value> = args.positional().iter().skip(positional_used).cloned().collect();
    if !extra.is_empty() {
        params.insert(POSITIONAL_PARAM.to_string(), Value::Array(extra));
    }
    params.insert(METHOD_PARAM.to_string(), Value::String(method.to_string()));

    let identifier = primary.map(|(_, id)| id);
    let sub_identifier = secondary.map(|(_, id)| id);
    match resource {
        ResourceType::PermissionSet => {
            keys::permission_set_key(operation, identifier, Some(&params))
        }
        ResourceType::Assignment => {
            keys::assignment_key(operation, identifier, sub_identifier, Some(&params))
        }
        _ => keys::build_key(
            resource.as_str(),
            operation,
            identifier,
            sub_identifier,
            Some(&params),
        ),
    }
}

/// First named argument in `names` holding an identifier, with its name.
fn find_named<'a>(args: &'a CallArgs, names: &[&'static str]) -> Option<(&'static str, &'a str)> {
    names
        .iter()
        .find_map(|name| args.get(name).and_then(identifier_value).map(|id| (*name, id)))
}

fn positional_str(args: &CallArgs, index: usize) -> Option<&str> {
    match args.positional().get(index) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}
