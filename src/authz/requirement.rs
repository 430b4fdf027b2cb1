use std::borrow::Cow;

use super::permissions;

/// The permission an operation needs before it may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequirement {
    name: Cow<'static, str>,
}

impl PermissionRequirement {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exact, case-sensitive comparison.
    pub fn is_satisfied_by(&self, granted: &str) -> bool {
        self.name == granted
    }
}

/// Statically declared requirement, used as the type parameter of
/// [`Authorized`](super::Authorized).
pub trait Requirement: Send + Sync + 'static {
    const PERMISSION: &'static str;

    fn requirement() -> PermissionRequirement {
        PermissionRequirement::new(Self::PERMISSION)
    }
}

macro_rules! requirements {
    ($($(#[$meta:meta])* $ty:ident => $perm:expr;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $ty;

            impl Requirement for $ty {
                const PERMISSION: &'static str = $perm;
            }
        )*
    };
}

requirements! {
    /// Every `/admin` endpoint.
    AdminPanelAccess => permissions::ADMIN_PANEL_ACCESS;
    ManageProjects => permissions::MANAGE_PROJECTS;
    ManageGroups => permissions::MANAGE_GROUPS;
    /// Creating tasks and (un)assigning users or groups.
    AssignTask => permissions::ASSIGN_TASK;
    EditTask => permissions::EDIT_TASK;
    CompleteTask => permissions::COMPLETE_TASK;
    DeleteTask => permissions::DELETE_TASK;
}
