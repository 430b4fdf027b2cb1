use std::sync::Arc;

use async_trait::async_trait;

use super::permissions::ADMIN_PANEL_ACCESS;
use super::principal::Principal;
use super::requirement::PermissionRequirement;
use super::store::PermissionStore;

/// Decides whether a principal satisfies a requirement. Never errors: every
/// failure path is a denial.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn can(&self, principal: &Principal, requirement: &PermissionRequirement) -> bool;
}

/// Evaluation order:
/// 1. unresolved principal -> deny
/// 2. `ADMIN_PANEL_ACCESS` claimed on the token -> allow
/// 3. no role -> deny
/// 4. role grants the permission in the store -> allow
/// 5. deny
pub struct StorePolicyEvaluator {
    store: Arc<dyn PermissionStore>,
}

impl StorePolicyEvaluator {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PolicyEvaluator for StorePolicyEvaluator {
    async fn can(&self, principal: &Principal, requirement: &PermissionRequirement) -> bool {
        let permission = requirement.name();

        if !principal.is_resolved() {
            tracing::debug!(user_id = %principal.user_id, permission, "unknown principal");
            return false;
        }

        // Only the admin panel honours a claim; every other permission comes
        // from the role.
        if permission == ADMIN_PANEL_ACCESS && principal.claims_permission(permission) {
            tracing::debug!(user_id = %principal.user_id, permission, "admin claim match");
            return true;
        }

        let Some(role_id) = principal.role_id() else {
            tracing::debug!(user_id = %principal.user_id, permission, "principal has no role");
            return false;
        };

        match self.store.permissions_for_role(role_id).await {
            Ok(granted) => {
                let allowed = granted.iter().any(|name| requirement.is_satisfied_by(name));
                tracing::debug!(
                    user_id = %principal.user_id,
                    role_id = %role_id,
                    permission,
                    allowed,
                    "role permission check"
                );
                allowed
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %principal.user_id,
                    role_id = %role_id,
                    permission,
                    error = %err,
                    "permission lookup failed; denying"
                );
                false
            }
        }
    }
}
