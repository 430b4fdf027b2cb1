use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

/// Pending, single-use invitation. The code itself is never stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Invitation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub role_id: Option<Uuid>,
    pub email: Option<String>,
    pub invited_by: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl Loggable for Invitation {
    fn entity_type() -> &'static str { "invitation" }
    fn subject_id(&self) -> Uuid { self.id }
}

pub const INVITATION_COLUMNS: &str = "id, company_id, role_id, email, invited_by, expires_at, created_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct InvitationCreateRequest {
    #[schema(example = "new.hire@acme.test")]
    pub email: Option<String>,
    /// Role for the invitee; the default employee role when omitted.
    pub role_id: Option<Uuid>,
    #[schema(example = 48)]
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvitationCreated {
    pub invitation: Invitation,
    /// Shown once; hand it to the invitee.
    pub code: String,
}
