//! Activity log: handlers publish domain events on a broadcast bus and a
//! background listener projects them into the `activity_log` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

const BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: ActivityPayload,
}

impl DomainEvent {
    pub fn new(name: String, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: ActivityPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<DomainEvent>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<DomainEvent>) {
    broadcast::channel(BUS_CAPACITY)
}

/// Caller details attached to an activity entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    #[serde(rename = "new")]
    pub current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

pub fn log_activity<T: Loggable>(event_bus: &EventBus, action: &str, actor_id: Option<Uuid>, entity: &T) {
    log_activity_with_context(event_bus, action, actor_id, entity, None, None);
}

/// Publishes `<entity>.<action>`. A full or receiver-less bus drops the event;
/// the request is never failed because of the audit trail.
pub fn log_activity_with_context<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity: entity.severity_for_action(action),
    };

    let event = DomainEvent::new(
        format!("{}.{}", T::entity_type(), action),
        actor_id,
        Some(entity.subject_id()),
        payload,
    );

    if event_bus.send(event).is_err() {
        tracing::debug!("activity event dropped: no listener");
    }
}

pub fn describe(event_name: &str) -> &'static str {
    match event_name {
        "company.registered" => "Company registered",
        "user.registered" => "New user registered",
        "user.role_changed" => "User role changed",
        "invitation.created" => "Invitation created",
        "invitation.accepted" => "Invitation accepted",
        "invitation.revoked" => "Invitation revoked",
        "role.created" => "Role created",
        "role.updated" => "Role updated",
        "role.deleted" => "Role deleted",
        "role_permissions.replaced" => "Role permissions replaced",
        "permission.created" => "Permission created",
        "permission.updated" => "Permission updated",
        "project.created" => "Project created",
        "project.updated" => "Project updated",
        "project.deleted" => "Project deleted",
        "group.created" => "Group created",
        "group.updated" => "Group updated",
        "group.deleted" => "Group deleted",
        "task.created" => "Task created",
        "task.updated" => "Task updated",
        "task.completed" => "Task completed",
        "task.deleted" => "Task deleted",
        _ => "System event",
    }
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<DomainEvent>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let properties = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("failed to serialize activity event: {}", e);
                continue;
            }
        };

        let result = sqlx::query(
            r#"
            INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id)
        .bind(&event.name)
        .bind(describe(&event.name))
        .bind(event.actor_id)
        .bind(event.subject_id)
        .bind(event.occurred_at)
        .bind(properties)
        .bind(event.payload.severity.as_str())
        .execute(&pool)
        .await;

        if let Err(e) = result {
            tracing::error!("failed to save activity log: {}", e);
        }
    }
    tracing::info!("activity listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Thing {
        id: Uuid,
    }

    impl Loggable for Thing {
        fn entity_type() -> &'static str { "thing" }
        fn subject_id(&self) -> Uuid { self.id }
        fn severity(&self) -> Severity { Severity::Critical }
    }

    #[tokio::test]
    async fn published_events_carry_name_and_severity() {
        let (bus, mut rx) = init_event_bus();
        let thing = Thing { id: Uuid::new_v4() };
        let actor = Uuid::new_v4();

        log_activity(&bus, "created", Some(actor), &thing);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "thing.created");
        assert_eq!(event.actor_id, Some(actor));
        assert_eq!(event.subject_id, Some(thing.id));
        assert_eq!(event.payload.severity, Severity::Critical);
    }

    #[test]
    fn publishing_without_listener_is_harmless() {
        let (bus, rx) = init_event_bus();
        drop(rx);
        log_activity(&bus, "created", None, &Thing { id: Uuid::new_v4() });
    }

    #[test]
    fn request_context_prefers_forwarded_for() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        headers.insert("x-real-ip", "10.9.9.9".parse().unwrap());
        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.ip.as_deref(), Some("10.0.0.1"));
    }
}
