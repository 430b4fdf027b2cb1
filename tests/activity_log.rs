mod common;

use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};

use common::spawn_app;

#[tokio::test]
async fn rbac_changes_are_logged_as_critical() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let role = t.create_role(&ceo, "Viewer").await?;
    let edit = t.permission_id(&ceo, "EDIT_TASK").await?;

    t.send(
        "PUT",
        &format!("/admin/roles/{role}/permissions"),
        Some(&ceo.token),
        Some(json!({ "permission_ids": [edit] })),
    )
    .await?;

    // The listener writes asynchronously.
    let mut row: Option<(String, String)> = None;
    for _ in 0..50 {
        row = sqlx::query_as(
            "SELECT severity, properties FROM activity_log WHERE event_name = 'role_permissions.replaced'",
        )
        .fetch_optional(&t.pool)
        .await?;
        if row.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let (severity, properties) = row.expect("role_permissions.replaced was never logged");
    assert_eq!(severity, "critical");

    let properties: Value = serde_json::from_str(&properties)?;
    assert_eq!(properties["payload"]["new"]["permissions"][0]["name"], "EDIT_TASK");
    assert_eq!(properties["payload"]["old"]["permissions"], json!([]));

    Ok(())
}

#[tokio::test]
async fn company_registration_is_logged() -> Result<()> {
    let t = spawn_app().await?;
    t.register_company("Acme", "ceo@acme.test").await?;

    let mut count = 0i64;
    for _ in 0..50 {
        count = sqlx::query_scalar("SELECT COUNT(1) FROM activity_log WHERE event_name = 'company.registered'")
            .fetch_one(&t.pool)
            .await?;
        if count > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(count, 1);

    Ok(())
}

#[tokio::test]
async fn revoking_an_invitation_is_logged() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    t.invite(&ceo, None, None).await?;

    let (_, listed) = t.send("GET", "/admin/invitations", Some(&ceo.token), None).await?;
    let id = listed[0]["id"].as_str().unwrap_or_default().to_string();

    let (status, _) = t
        .send("DELETE", &format!("/admin/invitations/{id}"), Some(&ceo.token), None)
        .await?;
    assert_eq!(status, axum::http::StatusCode::NO_CONTENT);

    let mut row: Option<(String, String)> = None;
    for _ in 0..50 {
        row = sqlx::query_as(
            "SELECT description, properties FROM activity_log WHERE event_name = 'invitation.revoked'",
        )
        .fetch_optional(&t.pool)
        .await?;
        if row.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let (description, properties) = row.expect("invitation.revoked was never logged");
    assert_eq!(description, "Invitation revoked");
    let properties: Value = serde_json::from_str(&properties)?;
    assert_eq!(properties["payload"]["new"]["id"], id);

    // Revoked codes are gone for good.
    let (status, _) = t
        .send("DELETE", &format!("/admin/invitations/{id}"), Some(&ceo.token), None)
        .await?;
    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);

    Ok(())
}
