//! Typed operations over any [`RemoteClient`].
//!
//! Each method only assembles [`CallArgs`] and forwards by name, so a
//! [`CachedClientWrapper`](super::CachedClientWrapper) gets caching for free.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CallArgs, RemoteClient};

/// Kind of principal an account assignment grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrincipalType {
    User,
    Group,
}

impl PrincipalType {
    pub fn as_str(self) -> &'static str {
        match self {
            PrincipalType::User => "USER",
            PrincipalType::Group => "GROUP",
        }
    }
}

/// Arguments shared by assignment creation and deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub instance_arn: String,
    pub account_id: String,
    pub permission_set_arn: String,
    pub principal_type: PrincipalType,
    pub principal_id: String,
}

impl AssignmentRequest {
    fn to_args(&self) -> CallArgs {
        CallArgs::new()
            .with("InstanceArn", self.instance_arn.as_str())
            .with("TargetId", self.account_id.as_str())
            .with("TargetType", "AWS_ACCOUNT")
            .with("PermissionSetArn", self.permission_set_arn.as_str())
            .with("PrincipalType", self.principal_type.as_str())
            .with("PrincipalId", self.principal_id.as_str())
    }
}

// == Identity Store ==
/// Users, groups and memberships.
pub trait IdentityStoreOps {
    type Error;

    fn list_users(&self, store_id: &str, next_token: Option<&str>) -> Result<Value, Self::Error>;
    fn describe_user(&self, store_id: &str, user_id: &str) -> Result<Value, Self::Error>;
    fn create_user(&self, store_id: &str, user: Value) -> Result<Value, Self::Error>;
    fn update_user(
        &self,
        store_id: &str,
        user_id: &str,
        operations: Value,
    ) -> Result<Value, Self::Error>;
    fn delete_user(&self, store_id: &str, user_id: &str) -> Result<Value, Self::Error>;

    fn list_groups(&self, store_id: &str, next_token: Option<&str>) -> Result<Value, Self::Error>;
    fn describe_group(&self, store_id: &str, group_id: &str) -> Result<Value, Self::Error>;
    fn create_group(
        &self,
        store_id: &str,
        display_name: &str,
        description: Option<&str>,
    ) -> Result<Value, Self::Error>;
    fn delete_group(&self, store_id: &str, group_id: &str) -> Result<Value, Self::Error>;

    fn list_group_memberships(
        &self,
        store_id: &str,
        group_id: &str,
        next_token: Option<&str>,
    ) -> Result<Value, Self::Error>;
    fn create_group_membership(
        &self,
        store_id: &str,
        group_id: &str,
        user_id: &str,
    ) -> Result<Value, Self::Error>;
    /// Membership ids do not reveal the group, so this widens to every
    /// membership listing.
    fn delete_group_membership(
        &self,
        store_id: &str,
        membership_id: &str,
    ) -> Result<Value, Self::Error>;
}

impl<C: RemoteClient> IdentityStoreOps for C {
    type Error = C::Error;

    fn list_users(&self, store_id: &str, next_token: Option<&str>) -> Result<Value, Self::Error> {
        let args = store(store_id).with_opt("NextToken", next_token);
        self.invoke("list_users", &args)
    }

    fn describe_user(&self, store_id: &str, user_id: &str) -> Result<Value, Self::Error> {
        self.invoke("describe_user", &store(store_id).with("UserId", user_id))
    }

    fn create_user(&self, store_id: &str, user: Value) -> Result<Value, Self::Error> {
        let mut args = store(store_id);
        if let Value::Object(fields) = user {
            for (name, value) in fields {
                args = args.with(name, value);
            }
        }
        self.invoke("create_user", &args)
    }

    fn update_user(
        &self,
        store_id: &str,
        user_id: &str,
        operations: Value,
    ) -> Result<Value, Self::Error> {
        let args = store(store_id)
            .with("UserId", user_id)
            .with("Operations", operations);
        self.invoke("update_user", &args)
    }

    fn delete_user(&self, store_id: &str, user_id: &str) -> Result<Value, Self::Error> {
        self.invoke("delete_user", &store(store_id).with("UserId", user_id))
    }

    fn list_groups(&self, store_id: &str, next_token: Option<&str>) -> Result<Value, Self::Error> {
        let args = store(store_id).with_opt("NextToken", next_token);
        self.invoke("list_groups", &args)
    }

    fn describe_group(&self, store_id: &str, group_id: &str) -> Result<Value, Self::Error> {
        self.invoke("describe_group", &store(store_id).with("GroupId", group_id))
    }

    fn create_group(
        &self,
        store_id: &str,
        display_name: &str,
        description: Option<&str>,
    ) -> Result<Value, Self::Error> {
        let args = store(store_id)
            .with("DisplayName", display_name)
            .with_opt("Description", description);
        self.invoke("create_group", &args)
    }

    fn delete_group(&self, store_id: &str, group_id: &str) -> Result<Value, Self::Error> {
        self.invoke("delete_group", &store(store_id).with("GroupId", group_id))
    }

    fn list_group_memberships(
        &self,
        store_id: &str,
        group_id: &str,
        next_token: Option<&str>,
    ) -> Result<Value, Self::Error> {
        let args = store(store_id)
            .with("GroupId", group_id)
            .with_opt("NextToken", next_token);
        self.invoke("list_group_memberships", &args)
    }

    fn create_group_membership(
        &self,
        store_id: &str,
        group_id: &str,
        user_id: &str,
    ) -> Result<Value, Self::Error> {
        let args = store(store_id)
            .with("GroupId", group_id)
            .with("MemberId", serde_json::json!({ "UserId": user_id }));
        self.invoke("create_group_membership", &args)
    }

    fn delete_group_membership(
        &self,
        store_id: &str,
        membership_id: &str,
    ) -> Result<Value, Self::Error> {
        let args = store(store_id).with("MembershipId", membership_id);
        self.invoke("delete_group_membership", &args)
    }
}

fn store(store_id: &str) -> CallArgs {
    CallArgs::new().with("IdentityStoreId", store_id)
}

// == SSO Admin ==
/// Permission sets, account assignments and the accounts they target.
pub trait SsoAdminOps {
    type Error;

    fn list_permission_sets(
        &self,
        instance_arn: &str,
        next_token: Option<&str>,
    ) -> Result<Value, Self::Error>;
    fn describe_permission_set(
        &self,
        instance_arn: &str,
        permission_set_arn: &str,
    ) -> Result<Value, Self::Error>;
    fn update_permission_set(
        &self,
        instance_arn: &str,
        permission_set_arn: &str,
        description: &str,
    ) -> Result<Value, Self::Error>;
    fn delete_permission_set(
        &self,
        instance_arn: &str,
        permission_set_arn: &str,
    ) -> Result<Value, Self::Error>;
    /// Pushes a permission set to one account, or to every provisioned
    /// account when `account_id` is `None`.
    fn provision_permission_set(
        &self,
        instance_arn: &str,
        permission_set_arn: &str,
        account_id: Option<&str>,
    ) -> Result<Value, Self::Error>;

    fn list_account_assignments(
        &self,
        instance_arn: &str,
        account_id: &str,
        permission_set_arn: &str,
        next_token: Option<&str>,
    ) -> Result<Value, Self::Error>;
    fn create_account_assignment(&self, request: &AssignmentRequest) -> Result<Value, Self::Error>;
    fn delete_account_assignment(&self, request: &AssignmentRequest) -> Result<Value, Self::Error>;

    fn list_accounts(&self, next_token: Option<&str>) -> Result<Value, Self::Error>;
    fn describe_account(&self, account_id: &str) -> Result<Value, Self::Error>;
}

impl<C: RemoteClient> SsoAdminOps for C {
    type Error = C::Error;

    fn list_permission_sets(
        &self,
        instance_arn: &str,
        next_token: Option<&str>,
    ) -> Result<Value, Self::Error> {
        let args = instance(instance_arn).with_opt("NextToken", next_token);
        self.invoke("list_permission_sets", &args)
    }

    fn describe_permission_set(
        &self,
        instance_arn: &str,
        permission_set_arn: &str,
    ) -> Result<Value, Self::Error> {
        let args = instance(instance_arn).with("PermissionSetArn", permission_set_arn);
        self.invoke("describe_permission_set", &args)
    }

    fn update_permission_set(
        &self,
        instance_arn: &str,
        permission_set_arn: &str,
        description: &str,
    ) -> Result<Value, Self::Error> {
        let args = instance(instance_arn)
            .with("PermissionSetArn", permission_set_arn)
            .with("Description", description);
        self.invoke("update_permission_set", &args)
    }

    fn delete_permission_set(
        &self,
        instance_arn: &str,
        permission_set_arn: &str,
    ) -> Result<Value, Self::Error> {
        let args = instance(instance_arn).with("PermissionSetArn", permission_set_arn);
        self.invoke("delete_permission_set", &args)
    }

    fn provision_permission_set(
        &self,
        instance_arn: &str,
        permission_set_arn: &str,
        account_id: Option<&str>,
    ) -> Result<Value, Self::Error> {
        let target_type = match account_id {
            Some(_) => "AWS_ACCOUNT",
            None => "ALL_PROVISIONED_ACCOUNTS",
        };
        let args = instance(instance_arn)
            .with("PermissionSetArn", permission_set_arn)
            .with("TargetType", target_type)
            .with_opt("TargetId", account_id);
        self.invoke("provision_permission_set", &args)
    }

    fn list_account_assignments(
        &self,
        instance_arn: &str,
        account_id: &str,
        permission_set_arn: &str,
        next_token: Option<&str>,
    ) -> Result<Value, Self::Error> {
        let args = instance(instance_arn)
            .with("AccountId", account_id)
            .with("PermissionSetArn", permission_set_arn)
            .with_opt("NextToken", next_token);
        self.invoke("list_account_assignments", &args)
    }

    fn create_account_assignment(&self, request: &AssignmentRequest) -> Result<Value, Self::Error> {
        self.invoke("create_account_assignment", &request.to_args())
    }

    fn delete_account_assignment(&self, request: &AssignmentRequest) -> Result<Value, Self::Error> {
        self.invoke("delete_account_assignment", &request.to_args())
    }

    fn list_accounts(&self, next_token: Option<&str>) -> Result<Value, Self::Error> {
        let args = CallArgs::new().with_opt("NextToken", next_token);
        self.invoke("list_accounts", &args)
    }

    fn describe_account(&self, account_id: &str) -> Result<Value, Self::Error> {
        self.invoke("describe_account", &CallArgs::new().with("AccountId", account_id))
    }
}

fn instance(instance_arn: &str) -> CallArgs {
    CallArgs::new().with("InstanceArn", instance_arn)
}
