//! Work groups: named sets of company members that tasks can be assigned to.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Authorized, ManageGroups, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::group::{Group, GroupCreateRequest, GroupDetail, GroupUpdateRequest, GROUP_COLUMNS};
use crate::models::MemberRequest;
use crate::routes::companies::ensure_company_member;
use crate::routes::projects::required_name;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/groups",
    tag = "Groups",
    responses((status = 200, description = "Groups of the caller's company", body = [Group])),
    security(("bearerAuth" = []))
)]
pub async fn list_groups(State(state): State<AppState>, principal: Principal) -> AppResult<Json<Vec<Group>>> {
    let company_id = principal.require_company()?;

    let groups = sqlx::query_as::<_, Group>(&format!(
        "SELECT {GROUP_COLUMNS} FROM work_groups WHERE company_id = ? ORDER BY name"
    ))
    .bind(company_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(groups))
}

#[utoipa::path(
    post,
    path = "/groups",
    tag = "Groups",
    request_body = GroupCreateRequest,
    responses((status = 201, description = "Group created", body = Group)),
    security(("bearerAuth" = []))
)]
pub async fn create_group(
    State(state): State<AppState>,
    caller: Authorized<ManageGroups>,
    headers: HeaderMap,
    Json(payload): Json<GroupCreateRequest>,
) -> AppResult<(StatusCode, Json<Group>)> {
    let company_id = caller.require_company()?;

    let now = utc_now();
    let group = Group {
        id: Uuid::new_v4(),
        company_id,
        name: required_name(&payload.name)?,
        description: payload.description,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO work_groups (id, company_id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(group.id)
    .bind(group.company_id)
    .bind(&group.name)
    .bind(&group.description)
    .bind(group.created_at)
    .bind(group.updated_at)
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.events,
        "created",
        Some(caller.user_id),
        &group,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    get,
    path = "/groups/{id}",
    tag = "Groups",
    params(("id" = Uuid, Path, description = "Group id")),
    responses(
        (status = 200, description = "Group with its members", body = GroupDetail),
        (status = 404, description = "Group not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_group(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<GroupDetail>> {
    let company_id = principal.require_company()?;
    let group = fetch_group(&state.pool, company_id, id).await?;

    let member_ids: Vec<Uuid> = sqlx::query_scalar("SELECT user_id FROM group_members WHERE group_id = ?")
        .bind(id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(GroupDetail { group, member_ids }))
}

#[utoipa::path(
    put,
    path = "/groups/{id}",
    tag = "Groups",
    params(("id" = Uuid, Path, description = "Group id")),
    request_body = GroupUpdateRequest,
    responses((status = 200, description = "Group updated", body = Group)),
    security(("bearerAuth" = []))
)]
pub async fn update_group(
    State(state): State<AppState>,
    caller: Authorized<ManageGroups>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<GroupUpdateRequest>,
) -> AppResult<Json<Group>> {
    let company_id = caller.require_company()?;
    let old = fetch_group(&state.pool, company_id, id).await?;
    let mut group = old.clone();

    if let Some(name) = payload.name.as_deref() {
        group.name = required_name(name)?;
    }
    if payload.description.is_some() {
        group.description = payload.description;
    }
    group.updated_at = utc_now();

    sqlx::query("UPDATE work_groups SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.updated_at)
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.events,
        "updated",
        Some(caller.user_id),
        &group,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(group))
}

#[utoipa::path(
    delete,
    path = "/groups/{id}",
    tag = "Groups",
    params(("id" = Uuid, Path, description = "Group id")),
    responses((status = 204, description = "Group deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_group(
    State(state): State<AppState>,
    caller: Authorized<ManageGroups>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    let group = fetch_group(&state.pool, company_id, id).await?;

    sqlx::query("DELETE FROM work_groups WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.events,
        "deleted",
        Some(caller.user_id),
        &group,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/groups/{id}/members",
    tag = "Groups",
    params(("id" = Uuid, Path, description = "Group id")),
    request_body = MemberRequest,
    responses(
        (status = 204, description = "Member added"),
        (status = 404, description = "Group or user not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_group_member(
    State(state): State<AppState>,
    caller: Authorized<ManageGroups>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MemberRequest>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    fetch_group(&state.pool, company_id, id).await?;
    ensure_company_member(&state.pool, company_id, payload.user_id).await?;

    sqlx::query("INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?, ?)")
        .bind(id)
        .bind(payload.user_id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/groups/{id}/members/{user_id}",
    tag = "Groups",
    params(
        ("id" = Uuid, Path, description = "Group id"),
        ("user_id" = Uuid, Path, description = "Member id"),
    ),
    responses((status = 204, description = "Member removed")),
    security(("bearerAuth" = []))
)]
pub async fn remove_group_member(
    State(state): State<AppState>,
    caller: Authorized<ManageGroups>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    fetch_group(&state.pool, company_id, id).await?;

    let affected = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("member not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_group(pool: &SqlitePool, company_id: Uuid, group_id: Uuid) -> AppResult<Group> {
    sqlx::query_as::<_, Group>(&format!(
        "SELECT {GROUP_COLUMNS} FROM work_groups WHERE id = ? AND company_id = ?"
    ))
    .bind(group_id)
    .bind(company_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("group not found"))
}
