//! Authorization engine.
//!
//! Every protected endpoint declares one required permission name. A request
//! passes when the caller's current role grants that permission in the store,
//! or when the caller's token carries a literal permission claim for it.
//! Grants are read fresh on every check; nothing is cached, so an admin's
//! change applies to the affected users' very next request.
//!
//! Membership in the global `CEO` role implies `ADMIN_PANEL_ACCESS` because the
//! role is seeded with that grant and global roles cannot be edited through
//! the API. There is no separate role-name bypass.

mod evaluator;
mod guard;
mod principal;
mod requirement;
pub mod store;

pub use evaluator::{PolicyEvaluator, StorePolicyEvaluator};
pub use guard::Authorized;
pub use principal::{Identity, Principal};
pub use requirement::{
    AdminPanelAccess, AssignTask, CompleteTask, DeleteTask, EditTask, ManageGroups, ManageProjects,
    PermissionRequirement, Requirement,
};
pub use store::{PermissionStore, SqlPermissionStore};

/// Well-known role names and seeded ids.
pub mod roles {
    use uuid::Uuid;

    pub const CEO: &str = "CEO";
    pub const EMPLOYEE: &str = "Employee";

    pub const CEO_ROLE_ID: Uuid = Uuid::from_u128(1);
    /// Role given to invitees whose invitation names none, and to users who
    /// register without an invitation.
    pub const DEFAULT_ROLE_ID: Uuid = Uuid::from_u128(2);
}

/// Well-known permission names. These are seeded and cannot be renamed.
pub mod permissions {
    pub const ADMIN_PANEL_ACCESS: &str = "ADMIN_PANEL_ACCESS";
    pub const MANAGE_PROJECTS: &str = "MANAGE_PROJECTS";
    pub const MANAGE_GROUPS: &str = "MANAGE_GROUPS";
    pub const ASSIGN_TASK: &str = "ASSIGN_TASK";
    pub const EDIT_TASK: &str = "EDIT_TASK";
    pub const COMPLETE_TASK: &str = "COMPLETE_TASK";
    pub const DELETE_TASK: &str = "DELETE_TASK";

    pub const BUILT_IN: [&str; 7] = [
        ADMIN_PANEL_ACCESS,
        MANAGE_PROJECTS,
        MANAGE_GROUPS,
        ASSIGN_TASK,
        EDIT_TASK,
        COMPLETE_TASK,
        DELETE_TASK,
    ];

    pub fn is_built_in(name: &str) -> bool {
        BUILT_IN.contains(&name)
    }
}
