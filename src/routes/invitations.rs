//! Single-use invitations into a company.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{AdminPanelAccess, Authorized};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::invitation::{Invitation, InvitationCreateRequest, InvitationCreated, INVITATION_COLUMNS};
use crate::routes::admin::fetch_visible_role;
use crate::utils::{generate_invite_code, hash_invite_code, normalize_email, utc_now};

const MAX_TTL_HOURS: i64 = 24 * 30;

#[utoipa::path(
    post,
    path = "/admin/invitations",
    tag = "Admin",
    request_body = InvitationCreateRequest,
    responses(
        (status = 201, description = "Invitation created; the code is only returned here", body = InvitationCreated),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_invitation(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    headers: HeaderMap,
    Json(payload): Json<InvitationCreateRequest>,
) -> AppResult<(StatusCode, Json<InvitationCreated>)> {
    let company_id = admin.require_company()?;

    if let Some(role_id) = payload.role_id {
        fetch_visible_role(&state.pool, company_id, role_id).await?;
    }

    let ttl_hours = payload.expires_in_hours.unwrap_or(state.invitation_ttl.num_hours());
    if !(1..=MAX_TTL_HOURS).contains(&ttl_hours) {
        return Err(AppError::bad_request(format!(
            "expires_in_hours must be between 1 and {MAX_TTL_HOURS}"
        )));
    }

    let code = generate_invite_code();
    let now = utc_now();
    let invitation = Invitation {
        id: Uuid::new_v4(),
        company_id,
        role_id: payload.role_id,
        email: payload.email.as_deref().map(normalize_email).filter(|e| !e.is_empty()),
        invited_by: Some(admin.user_id),
        expires_at: now + Duration::hours(ttl_hours),
        created_at: now,
    };

    sqlx::query(
        "INSERT INTO invitations (id, code_hash, company_id, role_id, email, invited_by, expires_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(invitation.id)
    .bind(hash_invite_code(&code))
    .bind(invitation.company_id)
    .bind(invitation.role_id)
    .bind(&invitation.email)
    .bind(invitation.invited_by)
    .bind(invitation.expires_at)
    .bind(invitation.created_at)
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.events,
        "created",
        Some(admin.user_id),
        &invitation,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(InvitationCreated { invitation, code })))
}

#[utoipa::path(
    get,
    path = "/admin/invitations",
    tag = "Admin",
    responses((status = 200, description = "Pending invitations of the company", body = [Invitation])),
    security(("bearerAuth" = []))
)]
pub async fn list_invitations(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
) -> AppResult<Json<Vec<Invitation>>> {
    let company_id = admin.require_company()?;

    let invitations = sqlx::query_as::<_, Invitation>(&format!(
        "SELECT {INVITATION_COLUMNS} FROM invitations WHERE company_id = ? ORDER BY created_at DESC"
    ))
    .bind(company_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(invitations))
}

#[utoipa::path(
    delete,
    path = "/admin/invitations/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "Invitation id")),
    responses(
        (status = 204, description = "Invitation revoked"),
        (status = 404, description = "Invitation not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let company_id = admin.require_company()?;

    let invitation = sqlx::query_as::<_, Invitation>(&format!(
        "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = ? AND company_id = ?"
    ))
    .bind(id)
    .bind(company_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("invitation not found"))?;

    let deleted = sqlx::query("DELETE FROM invitations WHERE id = ?")
        .bind(invitation.id)
        .execute(&state.pool)
        .await?;

    // Redeemed between the lookup and the delete.
    if deleted.rows_affected() == 0 {
        return Err(AppError::not_found("invitation not found"));
    }

    log_activity_with_context(
        &state.events,
        "revoked",
        Some(admin.user_id),
        &invitation,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Redeems `code` inside the caller's transaction by deleting the invitation.
///
/// Unknown, expired, already-used and wrong-recipient codes all produce the
/// same error.
pub(crate) async fn consume_invitation(
    conn: &mut SqliteConnection,
    code: &str,
    email: &str,
    now: DateTime<Utc>,
) -> AppResult<Invitation> {
    let invalid = || AppError::bad_request("invalid or expired invitation code");

    let invitation = sqlx::query_as::<_, Invitation>(&format!(
        "SELECT {INVITATION_COLUMNS} FROM invitations WHERE code_hash = ?"
    ))
    .bind(hash_invite_code(code))
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(invalid)?;

    if invitation.is_expired(now) {
        return Err(invalid());
    }
    if invitation.email.as_deref().is_some_and(|invited| invited != email) {
        return Err(invalid());
    }

    let deleted = sqlx::query("DELETE FROM invitations WHERE id = ?")
        .bind(invitation.id)
        .execute(&mut *conn)
        .await?;

    // A concurrent registration got there first.
    if deleted.rows_affected() == 0 {
        return Err(invalid());
    }

    Ok(invitation)
}
