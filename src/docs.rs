use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes::{admin, auth, companies, groups, health, invitations, projects, tasks};

#[derive(OpenApi)]
#[openapi(
	paths(
		health::health,
		auth::register,
		auth::login,
		auth::me,
		auth::my_permissions,
		auth::logout,
		companies::register_company,
		companies::my_company,
		companies::company_users,
		admin::list_roles,
		admin::create_role,
		admin::get_role,
		admin::update_role,
		admin::delete_role,
		admin::get_role_permissions,
		admin::replace_role_permissions,
		admin::list_permissions,
		admin::create_permission,
		admin::update_permission,
		admin::list_users,
		admin::update_user_role,
		invitations::create_invitation,
		invitations::list_invitations,
		invitations::revoke_invitation,
		projects::list_projects,
		projects::create_project,
		projects::get_project,
		projects::update_project,
		projects::delete_project,
		projects::list_project_members,
		projects::add_project_member,
		projects::remove_project_member,
		groups::list_groups,
		groups::create_group,
		groups::get_group,
		groups::update_group,
		groups::delete_group,
		groups::add_group_member,
		groups::remove_group_member,
		tasks::list_tasks,
		tasks::create_task,
		tasks::get_task,
		tasks::update_task,
		tasks::complete_task,
		tasks::delete_task,
		tasks::assign_user,
		tasks::unassign_user,
		tasks::assign_group,
		tasks::unassign_group
	),
	components(
		schemas(
			health::HealthResponse,
			auth::MessageResponse,
			auth::EffectivePermissions,
			models::MemberRequest,
			models::company::Company,
			models::company::CompanyRegistration,
			models::company::RegisterCompanyRequest,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::UpdateUserRoleRequest,
			models::rbac::Role,
			models::rbac::RoleCreateRequest,
			models::rbac::RoleUpdateRequest,
			models::rbac::Permission,
			models::rbac::PermissionCreateRequest,
			models::rbac::PermissionUpdateRequest,
			models::rbac::ReplaceRolePermissionsRequest,
			models::rbac::RolePermissionSet,
			models::invitation::Invitation,
			models::invitation::InvitationCreateRequest,
			models::invitation::InvitationCreated,
			models::project::Project,
			models::project::ProjectCreateRequest,
			models::project::ProjectUpdateRequest,
			models::group::Group,
			models::group::GroupCreateRequest,
			models::group::GroupUpdateRequest,
			models::group::GroupDetail,
			models::task::Task,
			models::task::TaskDetail,
			models::task::TaskCreateRequest,
			models::task::TaskUpdateRequest,
			models::task::TaskGroupRequest
		)
	),
	modifiers(&BearerAuth),
	tags(
		(name = "Health", description = "Liveness"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Companies", description = "Company onboarding"),
		(name = "Admin", description = "Roles, permissions, users and invitations"),
		(name = "Projects", description = "Project management"),
		(name = "Groups", description = "Work groups"),
		(name = "Tasks", description = "Task management")
	)
)]
pub struct ApiDoc;

/// Registers the `bearerAuth` scheme referenced by protected operations.
struct BearerAuth;

impl Modify for BearerAuth {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		if let Some(components) = openapi.components.as_mut() {
			components.add_security_scheme(
				"bearerAuth",
				SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
			);
		}
	}
}

pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
	let mut doc = ApiDoc::openapi();
	// Try-it-out targets the running backend by default.
	doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);
	doc
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn admin_replace_operation_is_documented() {
		let doc = serde_json::to_value(build_openapi(8000)).unwrap();
		let put = &doc["paths"]["/admin/roles/{role_id}/permissions"]["put"];
		assert!(put.is_object());
		assert_eq!(put["tags"][0], "Admin");
	}

	#[test]
	fn bearer_scheme_and_server_are_present() {
		let doc = serde_json::to_value(build_openapi(9000)).unwrap();
		assert_eq!(doc["components"]["securitySchemes"]["bearerAuth"]["scheme"], "bearer");
		assert_eq!(doc["servers"][0]["url"], "http://localhost:9000");
	}
}
