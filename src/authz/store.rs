//! Role/permission queries backing the engine, plus the transactional
//! replace used by the admin API.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::principal::Identity;
use crate::errors::{AppError, AppResult};
use crate::models::rbac::Permission;
use crate::utils::utc_now;

/// Lookups the evaluator needs. Implementations must not cache across calls.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// `None` when no such user exists.
    async fn find_identity(&self, user_id: Uuid) -> AppResult<Option<Identity>>;

    /// Names of every permission currently granted to `role_id`.
    async fn permissions_for_role(&self, role_id: Uuid) -> AppResult<HashSet<String>>;
}

#[derive(Debug, Clone)]
pub struct SqlPermissionStore {
    pool: SqlitePool,
}

impl SqlPermissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStore for SqlPermissionStore {
    async fn find_identity(&self, user_id: Uuid) -> AppResult<Option<Identity>> {
        let row = sqlx::query_as::<_, (Option<Uuid>, Option<Uuid>)>(
            "SELECT role_id, company_id FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(role_id, company_id)| Identity { role_id, company_id }))
    }

    async fn permissions_for_role(&self, role_id: Uuid) -> AppResult<HashSet<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name
            FROM permissions p
            INNER JOIN role_permissions rp ON p.id = rp.permission_id
            WHERE rp.role_id = ?
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names.into_iter().collect())
    }
}

pub async fn role_permissions(pool: &SqlitePool, role_id: Uuid) -> AppResult<Vec<Permission>> {
    let permissions = sqlx::query_as::<_, Permission>(
        r#"
        SELECT p.id, p.name, p.description, p.created_at, p.updated_at
        FROM permissions p
        INNER JOIN role_permissions rp ON p.id = rp.permission_id
        WHERE rp.role_id = ?
        ORDER BY p.name
        "#,
    )
    .bind(role_id)
    .fetch_all(pool)
    .await?;

    Ok(permissions)
}

/// Makes `permission_ids` the complete grant set of `role_id`.
///
/// Validation, the delete and the inserts share one transaction: a reader
/// sees either the old set or the new one, and a rejected request leaves the
/// role untouched.
pub async fn replace_role_permissions(
    pool: &SqlitePool,
    role_id: Uuid,
    permission_ids: &[Uuid],
) -> AppResult<Vec<Permission>> {
    let wanted: BTreeSet<Uuid> = permission_ids.iter().copied().collect();
    let mut tx = pool.begin().await?;

    let role_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM roles WHERE id = ?")
        .bind(role_id)
        .fetch_optional(&mut *tx)
        .await?;
    if role_exists.is_none() {
        return Err(AppError::not_found("role not found"));
    }

    for permission_id in &wanted {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM permissions WHERE id = ?")
            .bind(permission_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::not_found(format!("permission {permission_id} not found")));
        }
    }

    sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
        .bind(role_id)
        .execute(&mut *tx)
        .await?;

    let now = utc_now();
    for permission_id in &wanted {
        sqlx::query("INSERT INTO role_permissions (role_id, permission_id, created_at) VALUES (?, ?, ?)")
            .bind(role_id)
            .bind(permission_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(role_id = %role_id, count = wanted.len(), "role permissions replaced");
    role_permissions(pool, role_id).await
}
