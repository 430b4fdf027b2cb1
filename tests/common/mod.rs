#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use teamdesk::create_app;
use teamdesk::jwt::JwtConfig;

pub const JWT_SECRET: &str = "test-secret";
pub const PASSWORD: &str = "password123";

pub struct TestApp {
    _dir: TempDir,
    pub pool: SqlitePool,
    pub app: Router,
}

pub struct Member {
    pub token: String,
    pub user_id: String,
    pub company_id: Option<String>,
}

pub async fn spawn_app() -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", JWT_SECRET);
    let app = create_app(pool.clone()).await?;

    Ok(TestApp { _dir: dir, pool, app })
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    pub async fn register_company(&self, company: &str, email: &str) -> Result<Member> {
        let (status, body) = self
            .send(
                "POST",
                "/companies",
                None,
                Some(json!({
                    "company_name": company,
                    "first_name": "Chief",
                    "last_name": "Executive",
                    "email": email,
                    "password": PASSWORD
                })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "company registration failed: {status} {body}");
        member_from(&body)
    }

    /// Issues an invitation as `admin` and returns the raw code.
    pub async fn invite(&self, admin: &Member, role_id: Option<&str>, email: Option<&str>) -> Result<String> {
        let (status, body) = self
            .send(
                "POST",
                "/admin/invitations",
                Some(&admin.token),
                Some(json!({ "role_id": role_id, "email": email })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "invitation failed: {status} {body}");
        Ok(body["code"].as_str().context("missing code")?.to_string())
    }

    pub async fn register(&self, email: &str, invite_code: Option<&str>) -> Result<(StatusCode, Value)> {
        self.send(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "first_name": "Team",
                "last_name": "Member",
                "email": email,
                "password": PASSWORD,
                "invite_code": invite_code
            })),
        )
        .await
    }

    /// Invites and registers a new member of `admin`'s company.
    pub async fn join(&self, admin: &Member, role_id: Option<&str>, email: &str) -> Result<Member> {
        let code = self.invite(admin, role_id, None).await?;
        let (status, body) = self.register(email, Some(&code)).await?;
        anyhow::ensure!(status == StatusCode::CREATED, "registration failed: {status} {body}");
        member_from(&body)
    }

    pub async fn create_role(&self, admin: &Member, name: &str) -> Result<String> {
        let (status, body) = self
            .send("POST", "/admin/roles", Some(&admin.token), Some(json!({ "name": name })))
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "role creation failed: {status} {body}");
        Ok(body["id"].as_str().context("missing role id")?.to_string())
    }

    /// Id of a permission by name, from the admin listing.
    pub async fn permission_id(&self, admin: &Member, name: &str) -> Result<String> {
        let (_, body) = self.send("GET", "/admin/permissions", Some(&admin.token), None).await?;
        body.as_array()
            .context("permissions list")?
            .iter()
            .find(|p| p["name"] == name)
            .and_then(|p| p["id"].as_str())
            .map(str::to_string)
            .with_context(|| format!("permission {name} not listed"))
    }

    pub async fn create_project(&self, token: &str, name: &str) -> Result<String> {
        let (status, body) = self
            .send("POST", "/projects", Some(token), Some(json!({ "name": name })))
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "project creation failed: {status} {body}");
        Ok(body["id"].as_str().context("missing project id")?.to_string())
    }

    pub async fn create_task(&self, token: &str, project_id: &str, title: &str) -> Result<String> {
        let (status, body) = self
            .send(
                "POST",
                &format!("/projects/{project_id}/tasks"),
                Some(token),
                Some(json!({ "title": title })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "task creation failed: {status} {body}");
        Ok(body["id"].as_str().context("missing task id")?.to_string())
    }
}

pub fn member_from(body: &Value) -> Result<Member> {
    Ok(Member {
        token: body["token"].as_str().context("missing token")?.to_string(),
        user_id: body["user"]["id"].as_str().context("missing user id")?.to_string(),
        company_id: body["user"]["company_id"].as_str().map(str::to_string),
    })
}

/// Token with literal permission claims, as minted by the operator CLI.
pub fn claim_token(user_id: &str, permissions: &[&str]) -> Result<String> {
    let user_id: Uuid = user_id.parse()?;
    let claims = permissions.iter().map(|p| p.to_string()).collect();
    Ok(JwtConfig::new(JWT_SECRET, 1).encode_with_permissions(user_id, claims)?)
}
