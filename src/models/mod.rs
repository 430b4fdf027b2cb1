pub mod company;
pub mod group;
pub mod invitation;
pub mod project;
pub mod rbac;
pub mod task;
pub mod user;

use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Body for the membership join-table endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberRequest {
    pub user_id: Uuid,
}
