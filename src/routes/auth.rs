use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions::ADMIN_PANEL_ACCESS;
use crate::authz::{roles, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::rbac::{DbRole, Role, ROLE_COLUMNS};
use crate::models::user::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User, USER_COLUMNS};
use crate::routes::invitations::consume_invitation;
use crate::utils::{hash_password, normalize_email, utc_now, verify_password};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

/// The caller's current role and the permission names it grants.
#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub role: Option<Role>,
    pub permissions: Vec<String>,
}

pub(crate) struct NewUser<'a> {
    pub id: Uuid,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub company_id: Option<Uuid>,
    pub role_id: Uuid,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input or invalid/expired invitation code"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email);
    validate_person(&payload.first_name, &payload.last_name, &email)?;

    // Checked before any invitation is touched so a duplicate signup never burns a code.
    ensure_email_available(&state.pool, &email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    let invite_code = payload.invite_code.as_deref().map(str::trim).filter(|code| !code.is_empty());
    let invitation = match invite_code {
        Some(code) => Some(consume_invitation(&mut tx, code, &email, now).await?),
        None => None,
    };

    let company_id = invitation.as_ref().map(|inv| inv.company_id);
    let role_id = invitation
        .as_ref()
        .and_then(|inv| inv.role_id)
        .unwrap_or(roles::DEFAULT_ROLE_ID);

    insert_user(
        &mut tx,
        &NewUser {
            id: user_id,
            first_name: payload.first_name.trim(),
            last_name: payload.last_name.trim(),
            email: &email,
            password_hash: &password_hash,
            company_id,
            role_id,
        },
    )
    .await?;

    tx.commit().await?;

    let user: User = fetch_user_by_id(&state.pool, user_id).await?.into();
    let token = state.jwt.encode(user.id)?;
    let context = RequestContext::from_headers(&headers);

    log_activity_with_context(&state.events, "registered", Some(user.id), &user, None, Some(context.clone()));
    if let Some(invitation) = invitation.as_ref() {
        log_activity_with_context(&state.events, "accepted", Some(user.id), invitation, None, Some(context));
    }

    tracing::info!(user_id = %user.id, company_id = ?company_id, role_id = %role_id, "user registered");
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);
    let db_user = sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(db_user.id)?;
    let user: User = db_user.into();

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, principal: Principal) -> AppResult<Json<User>> {
    let user: User = fetch_user_by_id(&state.pool, principal.user_id).await?.into();
    Ok(Json(user))
}

#[utoipa::path(
    get,
    path = "/auth/me/permissions",
    tag = "Auth",
    responses((status = 200, description = "Effective permissions of the caller", body = EffectivePermissions)),
    security(("bearerAuth" = []))
)]
pub async fn my_permissions(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<EffectivePermissions>> {
    if !principal.is_resolved() {
        return Err(AppError::not_found("user not found"));
    }

    let role = match principal.role_id() {
        Some(role_id) => sqlx::query_as::<_, DbRole>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?"))
            .bind(role_id)
            .fetch_optional(&state.pool)
            .await?
            .map(Role::from),
        None => None,
    };

    let mut permissions: Vec<String> = match principal.role_id() {
        Some(role_id) => state.permissions.permissions_for_role(role_id).await?.into_iter().collect(),
        None => Vec::new(),
    };
    if principal.claims_permission(ADMIN_PANEL_ACCESS) && !permissions.iter().any(|p| p == ADMIN_PANEL_ACCESS) {
        permissions.push(ADMIN_PANEL_ACCESS.to_string());
    }
    permissions.sort();

    Ok(Json(EffectivePermissions {
        user_id: principal.user_id,
        role,
        permissions,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn logout(_principal: Principal) -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

pub(crate) fn validate_person(first_name: &str, last_name: &str, email: &str) -> AppResult<()> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(AppError::bad_request("first_name and last_name are required"));
    }
    if !email.contains('@') {
        return Err(AppError::bad_request("email is invalid"));
    }
    Ok(())
}

pub(crate) async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

pub(crate) async fn insert_user(conn: &mut SqliteConnection, user: &NewUser<'_>) -> AppResult<()> {
    let now = utc_now();

    sqlx::query(
        "INSERT INTO users (id, first_name, last_name, email, password_hash, company_id, role_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user.id)
    .bind(user.first_name)
    .bind(user.last_name)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.company_id)
    .bind(user.role_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}
