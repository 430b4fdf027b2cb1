mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{claim_token, spawn_app};

#[tokio::test]
async fn granting_edit_task_to_viewer_applies_on_next_request() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let viewer_role = t.create_role(&ceo, "Viewer").await?;
    let viewer = t.join(&ceo, Some(&viewer_role), "viewer@acme.test").await?;

    let project = t.create_project(&ceo.token, "Launch").await?;
    let task = t.create_task(&ceo.token, &project, "Draft notes").await?;
    let task_uri = format!("/projects/{project}/tasks/{task}");

    let (status, body) = t
        .send("PUT", &task_uri, Some(&viewer.token), Some(json!({ "title": "Edited" })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "forbidden: access denied");

    let edit_task = t.permission_id(&ceo, "EDIT_TASK").await?;
    let (status, _) = t
        .send(
            "PUT",
            &format!("/admin/roles/{viewer_role}/permissions"),
            Some(&ceo.token),
            Some(json!({ "permission_ids": [edit_task] })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    // Same token, no change to the user record.
    let (status, body) = t
        .send("PUT", &task_uri, Some(&viewer.token), Some(json!({ "title": "Edited" })))
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["title"], "Edited");

    // Revoking is just as immediate.
    t.send(
        "PUT",
        &format!("/admin/roles/{viewer_role}/permissions"),
        Some(&ceo.token),
        Some(json!({ "permission_ids": [] })),
    )
    .await?;
    let (status, _) = t
        .send("PUT", &task_uri, Some(&viewer.token), Some(json!({ "title": "Again" })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn user_without_role_is_denied_everything() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let member = t.join(&ceo, None, "member@acme.test").await?;
    let project = t.create_project(&ceo.token, "Launch").await?;
    let task = t.create_task(&ceo.token, &project, "Ship").await?;

    let user_id: Uuid = member.user_id.parse()?;
    sqlx::query("UPDATE users SET role_id = NULL WHERE id = ?")
        .bind(user_id)
        .execute(&t.pool)
        .await?;

    let attempts = [
        ("POST", format!("/projects/{project}/tasks/{task}/complete"), None),
        ("PUT", format!("/projects/{project}/tasks/{task}"), Some(json!({ "title": "x" }))),
        ("DELETE", format!("/projects/{project}/tasks/{task}"), None),
        ("POST", format!("/projects/{project}/tasks"), Some(json!({ "title": "x" }))),
        ("POST", "/projects".to_string(), Some(json!({ "name": "x" }))),
        ("POST", "/groups".to_string(), Some(json!({ "name": "x" }))),
        ("GET", "/admin/roles".to_string(), None),
    ];
    for (method, uri, body) in attempts {
        let (status, body) = t.send(method, &uri, Some(&member.token), body).await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
        assert_eq!(body["message"], "forbidden: access denied");
    }

    // Reads that need no permission still work.
    let (status, _) = t.send("GET", "/projects", Some(&member.token), None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn ceo_role_alone_opens_the_admin_panel() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;

    let (status, body) = t.send("GET", "/admin/roles", Some(&ceo.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .map(|roles| roles.iter().filter_map(|r| r["name"].as_str()).collect())
        .unwrap_or_default();
    assert!(names.contains(&"CEO"));
    assert!(names.contains(&"Employee"));

    let (status, body) = t.send("GET", "/auth/me/permissions", Some(&ceo.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"]["name"], "CEO");
    assert!(body["permissions"]
        .as_array()
        .is_some_and(|p| p.iter().any(|name| name == "ADMIN_PANEL_ACCESS")));

    Ok(())
}

#[tokio::test]
async fn admin_claim_alone_opens_the_admin_panel() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let employee = t.join(&ceo, None, "employee@acme.test").await?;

    let (status, _) = t.send("GET", "/admin/roles", Some(&employee.token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let token = claim_token(&employee.user_id, &["ADMIN_PANEL_ACCESS"])?;
    let (status, _) = t.send("GET", "/admin/roles", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    // The claim covers exactly one permission.
    let (status, _) = t
        .send("POST", "/projects", Some(&token), Some(json!({ "name": "Side project" })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn unknown_user_is_denied_even_with_claims() -> Result<()> {
    let t = spawn_app().await?;
    let token = claim_token(&Uuid::new_v4().to_string(), &["ADMIN_PANEL_ACCESS"])?;

    let (status, body) = t.send("GET", "/admin/roles", Some(&token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "forbidden: access denied");

    Ok(())
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() -> Result<()> {
    let t = spawn_app().await?;

    let (status, _) = t.send("GET", "/admin/roles", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.send("GET", "/admin/roles", Some("not-a-jwt"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn default_employee_may_only_complete_tasks() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let employee = t.join(&ceo, None, "employee@acme.test").await?;
    let project = t.create_project(&ceo.token, "Launch").await?;
    let task = t.create_task(&ceo.token, &project, "Ship").await?;

    let (status, body) = t
        .send(
            "POST",
            &format!("/projects/{project}/tasks/{task}/complete"),
            Some(&employee.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (status, _) = t
        .send("DELETE", &format!("/projects/{project}/tasks/{task}"), Some(&employee.token), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn task_permission_claims_do_not_bypass_the_role() -> Result<()> {
    let t = spawn_app().await?;
    let ceo = t.register_company("Acme", "ceo@acme.test").await?;
    let viewer_role = t.create_role(&ceo, "Viewer").await?;
    let viewer = t.join(&ceo, Some(&viewer_role), "viewer@acme.test").await?;
    let project = t.create_project(&ceo.token, "Launch").await?;
    let task = t.create_task(&ceo.token, &project, "Draft notes").await?;
    let task_uri = format!("/projects/{project}/tasks/{task}");

    let token = claim_token(&viewer.user_id, &["EDIT_TASK", "DELETE_TASK"])?;

    let (status, body) = t
        .send("PUT", &task_uri, Some(&token), Some(json!({ "title": "Edited" })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "forbidden: access denied");

    let (status, _) = t.send("DELETE", &task_uri, Some(&token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t.send("GET", "/auth/me/permissions", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permissions"], json!([]));

    let (status, _) = t.send("GET", &task_uri, Some(&ceo.token), None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}
