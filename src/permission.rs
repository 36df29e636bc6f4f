//! Wildcard permission model and the gate every service call goes through.
//!
//! A permission is a `(domain, action)` pair. The literal `*` in either slot
//! matches any value in that slot; there is no other pattern syntax, so
//! `us*` is just a string that happens to contain an asterisk.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use utoipa::ToSchema;

use crate::error::ServiceError;

pub const WILDCARD: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    #[schema(value_type = String, example = "user")]
    pub domain: Cow<'static, str>,
    #[schema(value_type = String, example = "READ")]
    pub action: Cow<'static, str>,
}

impl Permission {
    #[must_use]
    pub fn new(domain: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            domain: Cow::Owned(domain.into()),
            action: Cow::Owned(action.into()),
        }
    }

    #[must_use]
    pub const fn from_static(domain: &'static str, action: &'static str) -> Self {
        Self {
            domain: Cow::Borrowed(domain),
            action: Cow::Borrowed(action),
        }
    }

    /// True when this held permission covers `required`.
    #[must_use]
    pub fn covers(&self, required: &Self) -> bool {
        (self.domain == required.domain || self.domain == WILDCARD)
            && (self.action == required.action || self.action == WILDCARD)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.domain == WILDCARD && self.action == WILDCARD
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.action)
    }
}

/// Permissions known to the services. Roles may carry any other pair too.
pub mod catalog {
    use super::Permission;

    pub const ADMIN: Permission = Permission::from_static("*", "*");

    pub const USER_CREATE: Permission = Permission::from_static("user", "CREATE");
    pub const USER_READ: Permission = Permission::from_static("user", "READ");
    pub const USER_UPDATE: Permission = Permission::from_static("user", "UPDATE");
    pub const USER_SELF_UPDATE: Permission = Permission::from_static("user", "SELF_UPDATE");
    pub const USER_DELETE: Permission = Permission::from_static("user", "DELETE");

    pub const ROLE_CREATE: Permission = Permission::from_static("role", "CREATE");
    pub const ROLE_READ: Permission = Permission::from_static("role", "READ");
    pub const ROLE_UPDATE: Permission = Permission::from_static("role", "UPDATE");
    pub const ROLE_DELETE: Permission = Permission::from_static("role", "DELETE");

    pub const FEEDBACK_CREATE: Permission = Permission::from_static("feedback", "CREATE");
    pub const FEEDBACK_READ: Permission = Permission::from_static("feedback", "READ");
    pub const FEEDBACK_UPDATE: Permission = Permission::from_static("feedback", "UPDATE");

    pub const STATS_READ: Permission = Permission::from_static("stats", "READ");
    pub const STATS_UPDATE: Permission = Permission::from_static("stats", "UPDATE");
}

#[must_use]
pub fn has_permission(held: &[Permission], required: &Permission) -> bool {
    held.iter().any(|permission| permission.covers(required))
}

/// # Errors
/// Returns `PermissionDenied` when nothing in `held` covers `required`.
pub fn check_permission(held: &[Permission], required: &Permission) -> Result<(), ServiceError> {
    if has_permission(held, required) {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied)
    }
}

/// Authorization input carried by every gated service call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionContext {
    pub permissions: Vec<Permission>,
    pub principal_id: Option<String>,
}

impl PermissionContext {
    #[must_use]
    pub fn new(principal_id: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            permissions,
            principal_id: Some(principal_id.into()),
        }
    }

    /// Context holding only `(*, *)` and no principal.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            permissions: vec![catalog::ADMIN],
            principal_id: None,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.permissions.iter().any(Permission::is_admin)
    }

    #[must_use]
    pub fn is_principal(&self, target_id: &str) -> bool {
        self.principal_id.as_deref() == Some(target_id)
    }

    /// # Errors
    /// Returns `PermissionDenied` when the context lacks `required`.
    pub fn require(&self, required: &Permission) -> Result<(), ServiceError> {
        check_permission(&self.permissions, required)
    }

    /// Passes for the target's own principal, an admin, or a holder of `required`.
    ///
    /// # Errors
    /// Returns `PermissionDenied` otherwise.
    pub fn require_self_or(&self, target_id: &str, required: &Permission) -> Result<(), ServiceError> {
        if self.is_principal(target_id) || self.is_admin() {
            return Ok(());
        }
        self.require(required)
    }
}

#[cfg(test)]
mod tests {
    use super::catalog::*;
    use super::*;

    #[test]
    fn wildcard_action_matches_any_action_in_domain() {
        let held = vec![Permission::new("user", "*")];
        assert!(has_permission(&held, &USER_READ));
        assert!(has_permission(&held, &USER_DELETE));
        assert!(!has_permission(&held, &ROLE_READ));
    }

    #[test]
    fn wildcard_domain_matches_any_domain_for_action() {
        let held = vec![Permission::new("*", "READ")];
        assert!(has_permission(&held, &USER_READ));
        assert!(has_permission(&held, &ROLE_READ));
        assert!(!has_permission(&held, &ROLE_DELETE));
    }

    #[test]
    fn admin_matches_everything() {
        let held = vec![ADMIN];
        for required in [USER_CREATE, ROLE_DELETE, FEEDBACK_UPDATE, Permission::new("x", "y")] {
            assert!(has_permission(&held, &required));
        }
    }

    #[test]
    fn no_prefix_matching() {
        let held = vec![Permission::new("us*", "READ"), Permission::new("user", "RE*")];
        assert!(!has_permission(&held, &USER_READ));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let held = vec![Permission::new("User", "read")];
        assert!(!has_permission(&held, &USER_READ));
    }

    #[test]
    fn empty_set_denies() {
        assert!(!has_permission(&[], &USER_READ));
        assert!(matches!(
            check_permission(&[], &USER_READ),
            Err(ServiceError::PermissionDenied)
        ));
    }

    #[test]
    fn require_self_or_allows_owner_and_admin() {
        let own = PermissionContext::new("abc", Vec::new());
        assert!(own.require_self_or("abc", &USER_READ).is_ok());
        assert!(own.require_self_or("other", &USER_READ).is_err());
        assert!(PermissionContext::admin().require_self_or("other", &USER_READ).is_ok());

        let reader = PermissionContext::new("abc", vec![USER_READ]);
        assert!(reader.require_self_or("other", &USER_READ).is_ok());
    }

    #[test]
    fn permission_serializes_as_pair() -> anyhow::Result<()> {
        let value = serde_json::to_value(&USER_READ)?;
        assert_eq!(value, serde_json::json!({"domain": "user", "action": "READ"}));
        let decoded: Permission = serde_json::from_value(value)?;
        assert_eq!(decoded, USER_READ);
        Ok(())
    }
}
