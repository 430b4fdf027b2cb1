use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{AssignTask, Authorized, CompleteTask, DeleteTask, EditTask, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::task::{
    Task, TaskCreateRequest, TaskDetail, TaskGroupRequest, TaskUpdateRequest, STATUS_COMPLETED, STATUS_IN_PROGRESS,
    STATUS_OPEN, TASK_COLUMNS,
};
use crate::models::MemberRequest;
use crate::routes::companies::ensure_company_member;
use crate::routes::groups::fetch_group;
use crate::routes::projects::fetch_project;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects/{project_id}/tasks",
    tag = "Tasks",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "List tasks", body = [Task])),
    security(("bearerAuth" = []))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    principal: Principal,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<Task>>> {
    let company_id = principal.require_company()?;
    fetch_project(&state.pool, company_id, project_id).await?;

    let tasks = sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ? ORDER BY due_date IS NULL, due_date, created_at"
    ))
    .bind(project_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/tasks",
    tag = "Tasks",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = TaskDetail),
        (status = 404, description = "Project, assignee or group not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    caller: Authorized<AssignTask>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<TaskDetail>)> {
    let company_id = caller.require_company()?;
    fetch_project(&state.pool, company_id, project_id).await?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title is required"));
    }

    let mut assignee_ids = payload.assignee_ids;
    assignee_ids.sort();
    assignee_ids.dedup();
    for user_id in &assignee_ids {
        ensure_company_member(&state.pool, company_id, *user_id).await?;
    }
    let mut group_ids = payload.group_ids;
    group_ids.sort();
    group_ids.dedup();
    for group_id in &group_ids {
        fetch_group(&state.pool, company_id, *group_id).await?;
    }

    let now = utc_now();
    let task = Task {
        id: Uuid::new_v4(),
        project_id,
        title: title.to_string(),
        description: payload.description,
        status: STATUS_OPEN.to_string(),
        due_date: payload.due_date,
        completed_at: None,
        created_by: Some(caller.user_id),
        created_at: now,
        updated_at: now,
    };

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO tasks (id, project_id, title, description, status, due_date, completed_at, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task.id)
    .bind(task.project_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.status)
    .bind(task.due_date)
    .bind(task.completed_at)
    .bind(task.created_by)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(&mut *tx)
    .await?;

    for user_id in &assignee_ids {
        sqlx::query("INSERT INTO user_tasks (user_id, task_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(task.id)
            .execute(&mut *tx)
            .await?;
    }
    for group_id in &group_ids {
        sqlx::query("INSERT INTO task_groups (task_id, group_id) VALUES (?, ?)")
            .bind(task.id)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    log_activity_with_context(
        &state.events,
        "created",
        Some(caller.user_id),
        &task,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((
        StatusCode::CREATED,
        Json(TaskDetail {
            task,
            assignee_ids,
            group_ids,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/tasks/{id}",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id"),
    ),
    responses(
        (status = 200, description = "Task with its assignments", body = TaskDetail),
        (status = 404, description = "Task not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_task(
    State(state): State<AppState>,
    principal: Principal,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<TaskDetail>> {
    let company_id = principal.require_company()?;
    let task = fetch_task(&state.pool, company_id, project_id, id).await?;
    Ok(Json(task_detail(&state.pool, task).await?))
}

/// Edit fields and move between `open` and `in_progress`
#[utoipa::path(
    put,
    path = "/projects/{project_id}/tasks/{id}",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id"),
    ),
    request_body = TaskUpdateRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Unsupported status"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_task(
    State(state): State<AppState>,
    caller: Authorized<EditTask>,
    headers: HeaderMap,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    let company_id = caller.require_company()?;
    let old = fetch_task(&state.pool, company_id, project_id, id).await?;
    let mut task = old.clone();

    if let Some(title) = payload.title.as_deref() {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::bad_request("title is required"));
        }
        task.title = title.to_string();
    }
    if payload.description.is_some() {
        task.description = payload.description;
    }
    if payload.due_date.is_some() {
        task.due_date = payload.due_date;
    }
    if let Some(status) = payload.status.as_deref() {
        if status != STATUS_OPEN && status != STATUS_IN_PROGRESS {
            return Err(AppError::bad_request(format!(
                "status must be {STATUS_OPEN} or {STATUS_IN_PROGRESS}"
            )));
        }
        task.status = status.to_string();
        task.completed_at = None;
    }
    task.updated_at = utc_now();

    sqlx::query(
        "UPDATE tasks SET title = ?, description = ?, due_date = ?, status = ?, completed_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.due_date)
    .bind(&task.status)
    .bind(task.completed_at)
    .bind(task.updated_at)
    .bind(id)
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.events,
        "updated",
        Some(caller.user_id),
        &task,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(task))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/tasks/{id}/complete",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id"),
    ),
    responses((status = 200, description = "Task completed", body = Task)),
    security(("bearerAuth" = []))
)]
pub async fn complete_task(
    State(state): State<AppState>,
    caller: Authorized<CompleteTask>,
    headers: HeaderMap,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Task>> {
    let company_id = caller.require_company()?;
    let old = fetch_task(&state.pool, company_id, project_id, id).await?;

    // Completing twice keeps the first completion time.
    if old.status == STATUS_COMPLETED {
        return Ok(Json(old));
    }

    let now = utc_now();
    let task = Task {
        status: STATUS_COMPLETED.to_string(),
        completed_at: Some(now),
        updated_at: now,
        ..old.clone()
    };

    sqlx::query("UPDATE tasks SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?")
        .bind(&task.status)
        .bind(task.completed_at)
        .bind(task.updated_at)
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.events,
        "completed",
        Some(caller.user_id),
        &task,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/tasks/{id}",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id"),
    ),
    responses((status = 204, description = "Task deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_task(
    State(state): State<AppState>,
    caller: Authorized<DeleteTask>,
    headers: HeaderMap,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    let task = fetch_task(&state.pool, company_id, project_id, id).await?;

    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.events,
        "deleted",
        Some(caller.user_id),
        &task,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/tasks/{id}/assignees",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id"),
    ),
    request_body = MemberRequest,
    responses((status = 204, description = "User assigned")),
    security(("bearerAuth" = []))
)]
pub async fn assign_user(
    State(state): State<AppState>,
    caller: Authorized<AssignTask>,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<MemberRequest>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    fetch_task(&state.pool, company_id, project_id, id).await?;
    ensure_company_member(&state.pool, company_id, payload.user_id).await?;

    sqlx::query("INSERT OR IGNORE INTO user_tasks (user_id, task_id) VALUES (?, ?)")
        .bind(payload.user_id)
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/tasks/{id}/assignees/{user_id}",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id"),
        ("user_id" = Uuid, Path, description = "Assignee id"),
    ),
    responses((status = 204, description = "User unassigned")),
    security(("bearerAuth" = []))
)]
pub async fn unassign_user(
    State(state): State<AppState>,
    caller: Authorized<AssignTask>,
    Path((project_id, id, user_id)): Path<(Uuid, Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    fetch_task(&state.pool, company_id, project_id, id).await?;

    let affected = sqlx::query("DELETE FROM user_tasks WHERE task_id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("assignment not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/tasks/{id}/groups",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id"),
    ),
    request_body = TaskGroupRequest,
    responses((status = 204, description = "Group assigned")),
    security(("bearerAuth" = []))
)]
pub async fn assign_group(
    State(state): State<AppState>,
    caller: Authorized<AssignTask>,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TaskGroupRequest>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    fetch_task(&state.pool, company_id, project_id, id).await?;
    fetch_group(&state.pool, company_id, payload.group_id).await?;

    sqlx::query("INSERT OR IGNORE INTO task_groups (task_id, group_id) VALUES (?, ?)")
        .bind(id)
        .bind(payload.group_id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/tasks/{id}/groups/{group_id}",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id"),
        ("group_id" = Uuid, Path, description = "Group id"),
    ),
    responses((status = 204, description = "Group unassigned")),
    security(("bearerAuth" = []))
)]
pub async fn unassign_group(
    State(state): State<AppState>,
    caller: Authorized<AssignTask>,
    Path((project_id, id, group_id)): Path<(Uuid, Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let company_id = caller.require_company()?;
    fetch_task(&state.pool, company_id, project_id, id).await?;

    let affected = sqlx::query("DELETE FROM task_groups WHERE task_id = ? AND group_id = ?")
        .bind(id)
        .bind(group_id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("assignment not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Task by id, only when its project belongs to `company_id`.
async fn fetch_task(pool: &SqlitePool, company_id: Uuid, project_id: Uuid, task_id: Uuid) -> AppResult<Task> {
    sqlx::query_as::<_, Task>(
        "SELECT t.id, t.project_id, t.title, t.description, t.status, t.due_date, t.completed_at, t.created_by, t.created_at, t.updated_at
         FROM tasks t
         JOIN projects p ON p.id = t.project_id
         WHERE t.id = ? AND t.project_id = ? AND p.company_id = ?",
    )
    .bind(task_id)
    .bind(project_id)
    .bind(company_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("task not found"))
}

async fn task_detail(pool: &SqlitePool, task: Task) -> AppResult<TaskDetail> {
    let assignee_ids: Vec<Uuid> = sqlx::query_scalar("SELECT user_id FROM user_tasks WHERE task_id = ?")
        .bind(task.id)
        .fetch_all(pool)
        .await?;
    let group_ids: Vec<Uuid> = sqlx::query_scalar("SELECT group_id FROM task_groups WHERE task_id = ?")
        .bind(task.id)
        .fetch_all(pool)
        .await?;

    Ok(TaskDetail {
        task,
        assignee_ids,
        group_ids,
    })
}
