use std::collections::HashSet;

use uuid::Uuid;

use super::store::PermissionStore;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;

/// What the store knows about a user at the time of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub role_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
}

/// The authenticated caller of a request.
///
/// `identity` is `None` when the token's subject could not be found in the
/// store; such a principal fails every permission check.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub identity: Option<Identity>,
    pub claimed_permissions: HashSet<String>,
}

impl Principal {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            identity: None,
            claimed_permissions: HashSet::new(),
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_claimed_permissions(mut self, perms: impl IntoIterator<Item = String>) -> Self {
        self.claimed_permissions = perms.into_iter().collect();
        self
    }

    /// Turns verified token claims into a principal. Lookup failures produce
    /// an unresolved principal rather than an error.
    pub async fn resolve(auth: AuthUser, store: &dyn PermissionStore) -> Self {
        let identity = match store.find_identity(auth.user_id).await {
            Ok(identity) => identity,
            Err(err) => {
                tracing::warn!(user_id = %auth.user_id, error = %err, "identity lookup failed");
                None
            }
        };

        Self {
            user_id: auth.user_id,
            identity,
            claimed_permissions: auth.claimed_permissions.into_iter().collect(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.identity.is_some()
    }

    pub fn role_id(&self) -> Option<Uuid> {
        self.identity.and_then(|i| i.role_id)
    }

    pub fn company_id(&self) -> Option<Uuid> {
        self.identity.and_then(|i| i.company_id)
    }

    pub fn claims_permission(&self, permission: &str) -> bool {
        self.claimed_permissions.contains(permission)
    }

    /// Company the caller acts within; tenant-scoped endpoints need one.
    pub fn require_company(&self) -> AppResult<Uuid> {
        self.company_id().ok_or_else(AppError::access_denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl PermissionStore for FailingStore {
        async fn find_identity(&self, _user_id: Uuid) -> AppResult<Option<Identity>> {
            Err(AppError::internal("store offline"))
        }

        async fn permissions_for_role(&self, _role_id: Uuid) -> AppResult<HashSet<String>> {
            Err(AppError::internal("store offline"))
        }
    }

    #[tokio::test]
    async fn store_failure_yields_unresolved_principal() {
        let auth = AuthUser {
            user_id: Uuid::new_v4(),
            claimed_permissions: vec!["EDIT_TASK".to_string()],
        };
        let principal = Principal::resolve(auth, &FailingStore).await;
        assert!(!principal.is_resolved());
        assert!(principal.claims_permission("EDIT_TASK"));
        assert!(principal.require_company().is_err());
    }

    #[test]
    fn accessors_follow_identity() {
        let company = Uuid::new_v4();
        let role = Uuid::new_v4();
        let principal = Principal::new(Uuid::new_v4()).with_identity(Identity {
            role_id: Some(role),
            company_id: Some(company),
        });
        assert_eq!(principal.role_id(), Some(role));
        assert_eq!(principal.require_company().unwrap(), company);
    }

    #[test]
    fn missing_company_is_a_generic_denial() {
        let principal = Principal::new(Uuid::new_v4()).with_identity(Identity {
            role_id: Some(Uuid::new_v4()),
            company_id: None,
        });
        let err = principal.require_company().unwrap_err();
        assert_eq!(err.to_string(), "forbidden: access denied");
    }
}
