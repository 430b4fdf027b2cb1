use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::Duration;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{PermissionStore, PolicyEvaluator, SqlPermissionStore, StorePolicyEvaluator};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{admin, auth, companies, groups, health, projects, tasks};

const DEFAULT_INVITATION_TTL_HOURS: i64 = 24 * 7;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub events: EventBus,
    pub permissions: Arc<dyn PermissionStore>,
    pub policy: Arc<dyn PolicyEvaluator>,
    pub invitation_ttl: Duration,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, events: EventBus) -> Self {
        let permissions: Arc<dyn PermissionStore> = Arc::new(SqlPermissionStore::new(pool.clone()));
        let policy: Arc<dyn PolicyEvaluator> = Arc::new(StorePolicyEvaluator::new(permissions.clone()));

        Self {
            pool,
            jwt: Arc::new(jwt),
            events,
            permissions,
            policy,
            invitation_ttl: Duration::hours(DEFAULT_INVITATION_TTL_HOURS),
        }
    }

    pub fn with_invitation_ttl(mut self, ttl: Duration) -> Self {
        self.invitation_ttl = ttl;
        self
    }
}

/// Builds the router from environment configuration and starts the activity
/// listener on the current runtime.
pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let invitation_ttl = invitation_ttl_from_env()?;

    let (events, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, events).with_invitation_ttl(invitation_ttl);
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/me/permissions", get(auth::my_permissions))
        .route("/logout", post(auth::logout));

    let company_routes = Router::new()
        .route("/", post(companies::register_company))
        .route("/me", get(companies::my_company))
        .route("/me/users", get(companies::company_users));

    let project_routes = Router::new()
        .route("/", get(projects::list_projects).post(projects::create_project))
        .route(
            "/:project_id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/:project_id/members",
            get(projects::list_project_members).post(projects::add_project_member),
        )
        .route("/:project_id/members/:user_id", delete(projects::remove_project_member));

    // Tasks are scoped to a project: /projects/:project_id/tasks
    let task_routes = Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route("/:id", get(tasks::get_task).put(tasks::update_task).delete(tasks::delete_task))
        .route("/:id/complete", post(tasks::complete_task))
        .route("/:id/assignees", post(tasks::assign_user))
        .route("/:id/assignees/:user_id", delete(tasks::unassign_user))
        .route("/:id/groups", post(tasks::assign_group))
        .route("/:id/groups/:group_id", delete(tasks::unassign_group));

    let group_routes = Router::new()
        .route("/", get(groups::list_groups).post(groups::create_group))
        .route("/:id", get(groups::get_group).put(groups::update_group).delete(groups::delete_group))
        .route("/:id/members", post(groups::add_group_member))
        .route("/:id/members/:user_id", delete(groups::remove_group_member));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/companies", company_routes)
        .nest("/admin", admin::routes())
        .nest("/projects", project_routes)
        .nest("/projects/:project_id/tasks", task_routes)
        .nest("/groups", group_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn invitation_ttl_from_env() -> Result<Duration, AppError> {
    let hours = match std::env::var("INVITATION_TTL_HOURS") {
        Ok(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|hours| *hours > 0)
            .ok_or_else(|| AppError::configuration("INVITATION_TTL_HOURS must be a positive integer"))?,
        Err(_) => DEFAULT_INVITATION_TTL_HOURS,
    };
    Ok(Duration::hours(hours))
}
