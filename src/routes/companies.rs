use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{roles, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::company::{Company, CompanyRegistration, RegisterCompanyRequest};
use crate::models::user::{DbUser, User, USER_COLUMNS};
use crate::routes::auth::{ensure_email_available, fetch_user_by_id, insert_user, validate_person, NewUser};
use crate::utils::{hash_password, normalize_email, utc_now};

/// Create a company and its first user, who becomes CEO
#[utoipa::path(
    post,
    path = "/companies",
    tag = "Companies",
    request_body = RegisterCompanyRequest,
    responses(
        (status = 201, description = "Company registered", body = CompanyRegistration),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already in use"),
        (status = 500, description = "CEO role is not provisioned"),
    )
)]
pub async fn register_company(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterCompanyRequest>,
) -> AppResult<(StatusCode, Json<CompanyRegistration>)> {
    let company_name = payload.company_name.trim();
    if company_name.is_empty() {
        return Err(AppError::bad_request("company_name is required"));
    }
    let email = normalize_email(&payload.email);
    validate_person(&payload.first_name, &payload.last_name, &email)?;
    ensure_email_available(&state.pool, &email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let company = Company {
        id: Uuid::new_v4(),
        name: company_name.to_string(),
        created_at: now,
        updated_at: now,
    };
    let user_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    let ceo_role: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM roles WHERE normalized_name = ? AND company_id IS NULL LIMIT 1")
            .bind(roles::CEO)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(ceo_role) = ceo_role else {
        tracing::error!("global CEO role is missing; refusing company registration");
        return Err(AppError::configuration("CEO role is not provisioned"));
    };

    sqlx::query("INSERT INTO companies (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(company.id)
        .bind(&company.name)
        .bind(company.created_at)
        .bind(company.updated_at)
        .execute(&mut *tx)
        .await?;

    insert_user(
        &mut tx,
        &NewUser {
            id: user_id,
            first_name: payload.first_name.trim(),
            last_name: payload.last_name.trim(),
            email: &email,
            password_hash: &password_hash,
            company_id: Some(company.id),
            role_id: ceo_role,
        },
    )
    .await?;

    tx.commit().await?;

    let user: User = fetch_user_by_id(&state.pool, user_id).await?.into();
    let token = state.jwt.encode(user.id)?;

    log_activity_with_context(
        &state.events,
        "registered",
        Some(user.id),
        &company,
        None,
        Some(RequestContext::from_headers(&headers)),
    );
    tracing::info!(company_id = %company.id, user_id = %user.id, "company registered");

    Ok((StatusCode::CREATED, Json(CompanyRegistration { token, user, company })))
}

#[utoipa::path(
    get,
    path = "/companies/me",
    tag = "Companies",
    responses(
        (status = 200, description = "The caller's company", body = Company),
        (status = 403, description = "Caller has no company"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn my_company(State(state): State<AppState>, principal: Principal) -> AppResult<Json<Company>> {
    let company_id = principal.require_company()?;

    let company = sqlx::query_as::<_, Company>("SELECT id, name, created_at, updated_at FROM companies WHERE id = ?")
        .bind(company_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("company not found"))?;

    Ok(Json(company))
}

#[utoipa::path(
    get,
    path = "/companies/me/users",
    tag = "Companies",
    responses((status = 200, description = "Colleagues in the caller's company", body = [User])),
    security(("bearerAuth" = []))
)]
pub async fn company_users(State(state): State<AppState>, principal: Principal) -> AppResult<Json<Vec<User>>> {
    let company_id = principal.require_company()?;

    let users = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE company_id = ? ORDER BY last_name, first_name"
    ))
    .bind(company_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(users.into_iter().map(User::from).collect()))
}

/// 404 unless `user_id` belongs to `company_id`.
pub(crate) async fn ensure_company_member(pool: &SqlitePool, company_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ? AND company_id = ?")
        .bind(user_id)
        .bind(company_id)
        .fetch_one(pool)
        .await?;

    if count == 0 {
        return Err(AppError::not_found("user not found"));
    }
    Ok(())
}
