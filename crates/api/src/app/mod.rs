//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store wiring (in-memory or Postgres) and the guard pipeline
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{MethodRouter, delete, get, post},
};
use tower::ServiceBuilder;

use storefront_auth::permissions::storefront as perms;
use storefront_auth::{CatalogError, Requirement};

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Every guarded route's requirement is checked against the role catalog
/// here, so a typo in a permission or role name fails startup.
pub fn build_app(services: Arc<AppServices>) -> Result<Router, CatalogError> {
    let guarded = |route: MethodRouter, requirement: Requirement| protect(&services, route, requirement);
    let manage_users = || Requirement::all_permissions([perms::MANAGE_USERS]);

    let router = Router::new()
        .route("/health", get(routes::system::health))
        .route("/whoami", guarded(get(routes::system::whoami), Requirement::Authenticated)?)
        .route(
            "/csrf-token",
            guarded(get(routes::system::csrf_token), Requirement::Authenticated)?,
        )
        .route("/mfa/setup", guarded(post(routes::mfa::setup), Requirement::Authenticated)?)
        .route("/mfa/verify", guarded(post(routes::mfa::verify), Requirement::Authenticated)?)
        .route("/audit-logs", guarded(get(routes::audit::list), Requirement::AdminOnly)?)
        .route("/admin/rbac/roles", guarded(get(routes::rbac::list_roles), Requirement::AdminOnly)?)
        .route(
            "/admin/rbac/explain/:principal_id",
            guarded(get(routes::rbac::explain_principal), Requirement::AdminOnly)?,
        )
        .route(
            "/admin/principals/:principal_id/roles",
            guarded(
                get(routes::principals::list_roles).post(routes::principals::assign_role),
                manage_users(),
            )?,
        )
        .route(
            "/admin/principals/:principal_id/roles/:role",
            guarded(delete(routes::principals::remove_role), manage_users())?,
        )
        .layer(Extension(services.clone()))
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::request_context)));

    Ok(router)
}

pub use services::AppServices;

fn protect(
    services: &AppServices,
    route: MethodRouter,
    requirement: Requirement,
) -> Result<MethodRouter, CatalogError> {
    requirement.validate(services.guard.catalog())?;
    let state = middleware::GuardState {
        guard: services.guard.clone(),
        jwt: services.jwt.clone(),
        requirement: Arc::new(requirement),
    };
    Ok(route.route_layer(axum::middleware::from_fn_with_state(state, middleware::guard)))
}
