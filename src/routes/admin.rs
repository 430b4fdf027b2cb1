//! Company administration: roles, permissions, role grants and user roles.
//!
//! Every endpoint here is gated by `ADMIN_PANEL_ACCESS` and nothing finer.
//! Changes are logged to the activity log with critical severity.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{permissions, store, AdminPanelAccess, Authorized};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::rbac::*;
use crate::models::user::{DbUser, UpdateUserRoleRequest, User, UserRoleChange, USER_COLUMNS};
use crate::routes::invitations;
use crate::utils::{normalize_role_name, utc_now};

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        // Roles
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:role_id", get(get_role).put(update_role).delete(delete_role))
        .route(
            "/roles/:role_id/permissions",
            get(get_role_permissions).put(replace_role_permissions),
        )
        // Permissions
        .route("/permissions", get(list_permissions).post(create_permission))
        .route("/permissions/:permission_id", put(update_permission))
        // Users
        .route("/users", get(list_users))
        .route("/users/:user_id/role", put(update_user_role))
        // Invitations
        .route(
            "/invitations",
            get(invitations::list_invitations).post(invitations::create_invitation),
        )
        .route("/invitations/:id", delete(invitations::revoke_invitation))
}

// =============================================================================
// ROLE ENDPOINTS
// =============================================================================

/// Global roles plus the caller's company roles
#[utoipa::path(
    get,
    path = "/admin/roles",
    tag = "Admin",
    responses((status = 200, description = "Roles visible to the company", body = Vec<Role>)),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
) -> AppResult<Json<Vec<Role>>> {
    let company_id = admin.require_company()?;

    let roles = sqlx::query_as::<_, DbRole>(&format!(
        "SELECT {ROLE_COLUMNS} FROM roles WHERE company_id IS NULL OR company_id = ? ORDER BY is_company_role, name"
    ))
    .bind(company_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(roles.into_iter().map(Role::from).collect()))
}

/// Create a company-scoped role
#[utoipa::path(
    post,
    path = "/admin/roles",
    tag = "Admin",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Role name already in use"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    headers: HeaderMap,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let company_id = admin.require_company()?;
    let name = validate_role_name(&req.name)?;
    ensure_role_name_available(&state.pool, company_id, &name, None).await?;

    let now = utc_now();
    let role = Role {
        id: Uuid::new_v4(),
        name,
        company_id: Some(company_id),
        is_company_role: true,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO roles (id, name, normalized_name, company_id, is_company_role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(role.id)
    .bind(&role.name)
    .bind(normalize_role_name(&role.name))
    .bind(role.company_id)
    .bind(role.is_company_role)
    .bind(role.created_at)
    .bind(role.updated_at)
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.events,
        "created",
        Some(admin.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/admin/roles/{role_id}",
    tag = "Admin",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role details", body = Role),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    let company_id = admin.require_company()?;
    let role = fetch_visible_role(&state.pool, company_id, role_id).await?;
    Ok(Json(role))
}

/// Rename a company role
#[utoipa::path(
    put,
    path = "/admin/roles/{role_id}",
    tag = "Admin",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role renamed", body = Role),
        (status = 403, description = "Global roles are read-only"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role name already in use"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
    Json(req): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    let company_id = admin.require_company()?;
    let old = fetch_editable_role(&state.pool, company_id, role_id).await?;
    let name = validate_role_name(&req.name)?;
    ensure_role_name_available(&state.pool, company_id, &name, Some(role_id)).await?;

    let now = utc_now();
    sqlx::query("UPDATE roles SET name = ?, normalized_name = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(normalize_role_name(&name))
        .bind(now)
        .bind(role_id)
        .execute(&state.pool)
        .await?;

    let role = Role {
        name,
        updated_at: now,
        ..old.clone()
    };

    log_activity_with_context(
        &state.events,
        "updated",
        Some(admin.user_id),
        &role,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/admin/roles/{role_id}",
    tag = "Admin",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "Global roles are read-only"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role still assigned to users"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let company_id = admin.require_company()?;
    let role = fetch_editable_role(&state.pool, company_id, role_id).await?;

    let holders: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE role_id = ?")
        .bind(role_id)
        .fetch_one(&state.pool)
        .await?;
    if holders > 0 {
        return Err(AppError::conflict(format!("role is assigned to {holders} user(s)")));
    }

    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(role_id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.events,
        "deleted",
        Some(admin.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/admin/roles/{role_id}/permissions",
    tag = "Admin",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Permissions granted by the role", body = Vec<Permission>),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role_permissions(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Vec<Permission>>> {
    let company_id = admin.require_company()?;
    fetch_visible_role(&state.pool, company_id, role_id).await?;

    Ok(Json(store::role_permissions(&state.pool, role_id).await?))
}

/// Replace the full permission set of a company role
#[utoipa::path(
    put,
    path = "/admin/roles/{role_id}/permissions",
    tag = "Admin",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    request_body = ReplaceRolePermissionsRequest,
    responses(
        (status = 200, description = "New permission set", body = RolePermissionSet),
        (status = 403, description = "Global roles are read-only"),
        (status = 404, description = "Role or permission not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn replace_role_permissions(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
    Json(req): Json<ReplaceRolePermissionsRequest>,
) -> AppResult<Json<RolePermissionSet>> {
    let company_id = admin.require_company()?;
    fetch_editable_role(&state.pool, company_id, role_id).await?;

    let old = RolePermissionSet {
        role_id,
        permissions: store::role_permissions(&state.pool, role_id).await?,
    };
    let permissions = store::replace_role_permissions(&state.pool, role_id, &req.permission_ids).await?;
    let set = RolePermissionSet { role_id, permissions };

    log_activity_with_context(
        &state.events,
        "replaced",
        Some(admin.user_id),
        &set,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(set))
}

// =============================================================================
// PERMISSION ENDPOINTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/admin/permissions",
    tag = "Admin",
    responses((status = 200, description = "All permissions", body = Vec<Permission>)),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    _admin: Authorized<AdminPanelAccess>,
) -> AppResult<Json<Vec<Permission>>> {
    let permissions = sqlx::query_as::<_, Permission>(
        "SELECT id, name, description, created_at, updated_at FROM permissions ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(permissions))
}

#[utoipa::path(
    post,
    path = "/admin/permissions",
    tag = "Admin",
    request_body = PermissionCreateRequest,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 409, description = "Permission name already exists"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    headers: HeaderMap,
    Json(req): Json<PermissionCreateRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    let name = validate_permission_name(&req.name)?;
    ensure_permission_name_available(&state.pool, &name).await?;

    let now = utc_now();
    let permission = Permission {
        id: Uuid::new_v4(),
        name,
        description: req.description,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO permissions (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(permission.id)
    .bind(&permission.name)
    .bind(&permission.description)
    .bind(permission.created_at)
    .bind(permission.updated_at)
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.events,
        "created",
        Some(admin.user_id),
        &permission,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(permission)))
}

/// Edit a permission's name or description
#[utoipa::path(
    put,
    path = "/admin/permissions/{permission_id}",
    tag = "Admin",
    params(("permission_id" = Uuid, Path, description = "Permission ID")),
    request_body = PermissionUpdateRequest,
    responses(
        (status = 200, description = "Permission updated", body = Permission),
        (status = 400, description = "Built-in permissions cannot be renamed"),
        (status = 404, description = "Permission not found"),
        (status = 409, description = "Permission name already exists"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_permission(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    headers: HeaderMap,
    Path(permission_id): Path<Uuid>,
    Json(req): Json<PermissionUpdateRequest>,
) -> AppResult<Json<Permission>> {
    let old = sqlx::query_as::<_, Permission>(
        "SELECT id, name, description, created_at, updated_at FROM permissions WHERE id = ?",
    )
    .bind(permission_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("permission not found"))?;

    let mut permission = old.clone();

    if let Some(new_name) = req.name.as_deref() {
        let new_name = validate_permission_name(new_name)?;
        if new_name != old.name {
            if permissions::is_built_in(&old.name) {
                return Err(AppError::bad_request(format!("{} is built in and cannot be renamed", old.name)));
            }
            ensure_permission_name_available(&state.pool, &new_name).await?;
            permission.name = new_name;
        }
    }
    if req.description.is_some() {
        permission.description = req.description;
    }
    permission.updated_at = utc_now();

    sqlx::query("UPDATE permissions SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(permission.updated_at)
        .bind(permission_id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.events,
        "updated",
        Some(admin.user_id),
        &permission,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(permission))
}

// =============================================================================
// USER ENDPOINTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "Admin",
    responses((status = 200, description = "Users of the company", body = Vec<User>)),
    security(("bearerAuth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
) -> AppResult<Json<Vec<User>>> {
    let company_id = admin.require_company()?;

    let users = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE company_id = ? ORDER BY last_name, first_name"
    ))
    .bind(company_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(users.into_iter().map(User::from).collect()))
}

/// Overwrite a user's single role
#[utoipa::path(
    put,
    path = "/admin/users/{user_id}/role",
    tag = "Admin",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = User),
        (status = 404, description = "User or role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user_role(
    State(state): State<AppState>,
    admin: Authorized<AdminPanelAccess>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRoleRequest>,
) -> AppResult<Json<User>> {
    let company_id = admin.require_company()?;

    let target = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ? AND company_id = ?"
    ))
    .bind(user_id)
    .bind(company_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))?;

    let role = fetch_visible_role(&state.pool, company_id, req.role_id).await?;

    let now = utc_now();
    sqlx::query("UPDATE users SET role_id = ?, updated_at = ? WHERE id = ?")
        .bind(role.id)
        .bind(now)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    let change = UserRoleChange {
        user_id,
        role_id: role.id,
        previous_role_id: target.role_id,
    };
    log_activity_with_context(
        &state.events,
        "role_changed",
        Some(admin.user_id),
        &change,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    let mut user = User::from(target);
    user.role_id = Some(role.id);
    user.updated_at = now;

    Ok(Json(user))
}

// =============================================================================
// HELPERS
// =============================================================================

/// Role by id if it is global or owned by `company_id`; 404 otherwise.
pub(crate) async fn fetch_visible_role(pool: &SqlitePool, company_id: Uuid, role_id: Uuid) -> AppResult<Role> {
    sqlx::query_as::<_, DbRole>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?"))
        .bind(role_id)
        .fetch_optional(pool)
        .await?
        .map(Role::from)
        .filter(|role| role.visible_to(company_id))
        .ok_or_else(|| AppError::not_found("role not found"))
}

async fn fetch_editable_role(pool: &SqlitePool, company_id: Uuid, role_id: Uuid) -> AppResult<Role> {
    let role = fetch_visible_role(pool, company_id, role_id).await?;
    if role.is_global() {
        return Err(AppError::forbidden("global roles cannot be modified"));
    }
    Ok(role)
}

async fn ensure_role_name_available(
    pool: &SqlitePool,
    company_id: Uuid,
    name: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let clash: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM roles WHERE normalized_name = ? AND (company_id IS NULL OR company_id = ?) LIMIT 1",
    )
    .bind(normalize_role_name(name))
    .bind(company_id)
    .fetch_optional(pool)
    .await?;

    match clash {
        Some(id) if Some(id) != except => Err(AppError::conflict(format!("role {name} already exists"))),
        _ => Ok(()),
    }
}

async fn ensure_permission_name_available(pool: &SqlitePool, name: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM permissions WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict(format!("permission {name} already exists")));
    }
    Ok(())
}

fn validate_role_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("role name is required"));
    }
    Ok(name.to_string())
}

fn validate_permission_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(AppError::bad_request("permission name must be a single non-empty word"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_names_are_single_words() {
        assert_eq!(validate_permission_name(" ARCHIVE_PROJECT ").unwrap(), "ARCHIVE_PROJECT");
        assert!(validate_permission_name("ARCHIVE PROJECT").is_err());
        assert!(validate_permission_name("   ").is_err());
    }

    #[test]
    fn role_names_are_trimmed() {
        assert_eq!(validate_role_name("  Viewer ").unwrap(), "Viewer");
        assert!(validate_role_name("").is_err());
    }
}
