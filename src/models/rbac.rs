use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

// =============================================================================
// ROLE
// =============================================================================

/// Access tier. Global roles (`company_id` empty) are shared by every tenant
/// and read-only through the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub company_id: Option<Uuid>,
    pub is_company_role: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn is_global(&self) -> bool {
        self.company_id.is_none()
    }

    pub fn visible_to(&self, company_id: Uuid) -> bool {
        self.company_id.map_or(true, |owner| owner == company_id)
    }
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub company_id: Option<Uuid>,
    pub is_company_role: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const ROLE_COLUMNS: &str = "id, name, normalized_name, company_id, is_company_role, created_at, updated_at";

impl From<DbRole> for Role {
    fn from(db: DbRole) -> Self {
        Role {
            id: db.id,
            name: db.name,
            company_id: db.company_id,
            is_company_role: db.is_company_role,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "Viewer")]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    #[schema(example = "Reviewer")]
    pub name: String,
}

// =============================================================================
// PERMISSION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Permission {
    fn entity_type() -> &'static str { "permission" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionCreateRequest {
    #[schema(example = "ARCHIVE_PROJECT")]
    pub name: String,
    #[schema(example = "Archive completed projects")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

// =============================================================================
// ROLE-PERMISSION SET
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceRolePermissionsRequest {
    /// The complete new grant set. Duplicates are ignored.
    pub permission_ids: Vec<Uuid>,
}

/// A role together with everything it grants.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RolePermissionSet {
    pub role_id: Uuid,
    pub permissions: Vec<Permission>,
}

impl Loggable for RolePermissionSet {
    fn entity_type() -> &'static str { "role_permissions" }
    fn subject_id(&self) -> Uuid { self.role_id }
    fn severity(&self) -> Severity { Severity::Critical }
}
