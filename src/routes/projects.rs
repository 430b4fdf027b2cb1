use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Authorized, ManageProjects, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::project::{Project, ProjectCreateRequest, ProjectUpdateRequest, PROJECT_COLUMNS};
use crate::models::MemberRequest;
use crate::routes::companies::ensure_company_member;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    responses((status = 200, description = "Projects of the caller's company", body = [Project])),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(State(state): State<AppState>, principal: Principal) -> AppResult<Json<Vec<Project>>> {
    let company_id = principal.require_company()?;

    let projects = sqlx::query_as::<_, Project>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE company_id = ? ORDER BY created_at DESC"
    ))
    .bind(company_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses((status = 201, description = "Project created", body = Project)),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    caller: Authorized<ManageProjects>,
    headers: HeaderMap,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    let company_id = caller.require_company()?;
    let name = required_name(&payload.name)?;

    let now = utc_now();
    let project = Project {
        id: Uuid::new_v4(),
        company_id,
        name,
        description: payload.description,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO projects (id, company_id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(project.id)
    .bind(project.company_id)
    .bind(&project.name)
    .bind(&project.description)
    .bind(project.created_at)
    .bind(project.updated_at)
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.events,
        "created",
        Some(caller.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = Project),
        (status = 404, description = "Project not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    let company_id = principal.require_company()?;
    Ok(Json(fetch_project(&state.pool, company_id, id).await?))
}

#[utoipa::path(
    put,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses((status = 200, description = "Project updated", body = Project)),
    security(("bearerAuth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    caller: Authorized<ManageProjects>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    let company_id = caller.require_company()?;
    let old = fetch_project(&state.pool, company_id, id).await?;
    let mut project = old.clone();

    if let Some(name) = payload.name.as_deref() {
        project.name = required_name(name)?;
    }
    if payload.description.is_some() {
        project.description = payload.description;
    }
    project.updated_at = utc_now();

    sqlx::query("UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ? AND company_id = ?")
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.updated_at)
        .bind(project.id)
        .bind(company_id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.events,
        "updated",
        Some(caller.user_id),
        &project,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses((status = 204, description = "Project and its tasks deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    caller: Authorized<ManageProjects>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    let project = fetch_project(&state.pool, company_id, id).await?;

    let affected = sqlx::query("DELETE FROM projects WHERE id = ? AND company_id = ?")
        .bind(id)
        .bind(company_id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("project not found"));
    }

    log_activity_with_context(
        &state.events,
        "deleted",
        Some(caller.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/members",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Ids of project members", body = [Uuid])),
    security(("bearerAuth" = []))
)]
pub async fn list_project_members(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Uuid>>> {
    let company_id = principal.require_company()?;
    fetch_project(&state.pool, company_id, id).await?;

    let members: Vec<Uuid> = sqlx::query_scalar("SELECT user_id FROM user_projects WHERE project_id = ?")
        .bind(id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(members))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/members",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = MemberRequest,
    responses(
        (status = 204, description = "Member added"),
        (status = 404, description = "Project or user not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_project_member(
    State(state): State<AppState>,
    caller: Authorized<ManageProjects>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MemberRequest>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    fetch_project(&state.pool, company_id, id).await?;
    ensure_company_member(&state.pool, company_id, payload.user_id).await?;

    sqlx::query("INSERT OR IGNORE INTO user_projects (user_id, project_id) VALUES (?, ?)")
        .bind(payload.user_id)
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/members/{user_id}",
    tag = "Projects",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Member id"),
    ),
    responses((status = 204, description = "Member removed")),
    security(("bearerAuth" = []))
)]
pub async fn remove_project_member(
    State(state): State<AppState>,
    caller: Authorized<ManageProjects>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    fetch_project(&state.pool, company_id, id).await?;

    let affected = sqlx::query("DELETE FROM user_projects WHERE project_id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("member not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_project(pool: &SqlitePool, company_id: Uuid, project_id: Uuid) -> AppResult<Project> {
    sqlx::query_as::<_, Project>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ? AND company_id = ?"
    ))
    .bind(project_id)
    .bind(company_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("project not found"))
}

pub(crate) fn required_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name is required"));
    }
    Ok(name.to_string())
}
