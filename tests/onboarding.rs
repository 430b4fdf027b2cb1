mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use common::spawn_app;

const INVALID_CODE: &str = "bad request: invalid or expired invitation code";

#[tokio::test]
async fn company_founder_becomes_ceo() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;

    let (status, body) = t.send("GET", "/auth/me", Some(&ceo.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role_id"], Uuid::from_u128(1).to_string());
    assert_eq!(body["company_id"].as_str(), ceo.company_id.as_deref());

    let (status, body) = t.send("GET", "/companies/me", Some(&ceo.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Acme");

    Ok(())
}

#[tokio::test]
async fn company_registration_fails_without_ceo_role() -> Result<()> {
    let t = spawn_app().await?;
    sqlx::query("DELETE FROM roles WHERE normalized_name = 'CEO'")
        .execute(&t.pool)
        .await?;

    let (status, _) = t
        .send(
            "POST",
            "/companies",
            None,
            Some(json!({
                "company_name": "Acme",
                "first_name": "Chief",
                "last_name": "Executive",
                "email": "ceo@acme.test",
                "password": common::PASSWORD
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let companies: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM companies").fetch_one(&t.pool).await?;
    let users: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users").fetch_one(&t.pool).await?;
    assert_eq!((companies, users), (0, 0));

    Ok(())
}

#[tokio::test]
async fn invitation_is_single_use() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let code = t.invite(&ceo, None, None).await?;

    let (status, body) = t.register("first@acme.test", Some(&code)).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["company_id"].as_str(), ceo.company_id.as_deref());
    assert_eq!(body["user"]["role_id"], Uuid::from_u128(2).to_string());

    let (status, reused) = t.register("second@acme.test", Some(&code)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, never_issued) = t.register("third@acme.test", Some("deadbeef")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reused, never_issued);
    assert_eq!(reused["message"], INVALID_CODE);

    Ok(())
}

#[tokio::test]
async fn invitation_assigns_its_role() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let role = t.create_role(&ceo, "Viewer").await?;
    let member = t.join(&ceo, Some(&role), "viewer@acme.test").await?;

    let (_, me) = t.send("GET", "/auth/me", Some(&member.token), None).await?;
    assert_eq!(me["role_id"], role);

    Ok(())
}

#[tokio::test]
async fn expired_invitation_is_rejected() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let code = t.invite(&ceo, None, None).await?;

    sqlx::query("UPDATE invitations SET expires_at = ?")
        .bind(Utc::now() - Duration::minutes(1))
        .execute(&t.pool)
        .await?;

    let (status, body) = t.register("late@acme.test", Some(&code)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], INVALID_CODE);

    Ok(())
}

#[tokio::test]
async fn duplicate_email_does_not_consume_the_invitation() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let code = t.invite(&ceo, None, None).await?;

    let (status, _) = t.register("ceo@acme.test", Some(&code)).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t.register("fresh@acme.test", Some(&code)).await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn addressed_invitation_only_admits_its_recipient() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let code = t.invite(&ceo, None, Some("Invitee@Acme.test")).await?;

    let (status, body) = t.register("someone.else@acme.test", Some(&code)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], INVALID_CODE);

    let (status, _) = t.register("invitee@acme.test", Some(&code)).await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn plain_registration_has_default_role_and_no_company() -> Result<()> {
    let t = spawn_app().await?;

    let (status, body) = t.register("solo@example.test", None).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["user"]["company_id"].is_null());
    assert_eq!(body["user"]["role_id"], Uuid::from_u128(2).to_string());

    let (status, _) = t.register("SOLO@example.test", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let token = body["token"].as_str().unwrap_or_default();
    let (status, body) = t.send("GET", "/projects", Some(token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "forbidden: access denied");

    Ok(())
}

#[tokio::test]
async fn invitation_codes_are_stored_hashed() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let code = t.invite(&ceo, None, None).await?;

    let stored: String = sqlx::query_scalar("SELECT code_hash FROM invitations").fetch_one(&t.pool).await?;
    assert_ne!(stored, code);
    assert_eq!(stored, teamdesk::utils::hash_invite_code(&code));

    let (status, body) = t.send("GET", "/admin/invitations", Some(&ceo.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body[0].get("code").is_none());

    Ok(())
}

#[tokio::test]
async fn login_and_short_password_edge_cases() -> Result<()> {
    let t = spawn_app().await?;

    let (status, _) = t
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "first_name": "A", "last_name": "B", "email": "short@example.test", "password": "short" })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    t.register("valid@example.test", None).await?;

    let (status, _) = t
        .send("POST", "/auth/login", None, Some(json!({ "email": "valid@example.test", "password": "wrongpassword" })))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .send("POST", "/auth/login", None, Some(json!({ "email": "nobody@example.test", "password": common::PASSWORD })))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t
        .send("POST", "/auth/login", None, Some(json!({ "email": " Valid@Example.test ", "password": common::PASSWORD })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());

    Ok(())
}
