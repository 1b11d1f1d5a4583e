//! Role assignment administration. Every change is audited.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use storefront_auth::{Denial, DenyReason, IdentityContext, PrincipalId, Role};

use crate::app::{errors, services::AppServices};

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

fn parse_principal(raw: &str) -> Result<PrincipalId, axum::response::Response> {
    raw.parse::<PrincipalId>()
        .map_err(|_| errors::bad_request("INVALID_PRINCIPAL_ID", "principal_id must be a UUID"))
}

async fn roles_response(services: &AppServices, principal_id: PrincipalId) -> axum::response::Response {
    match services.roles.roles_of(principal_id).await {
        Ok(roles) => (
            StatusCode::OK,
            Json(json!({
                "principal_id": principal_id.to_string(),
                "roles": roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /admin/principals/:principal_id/roles
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Path(principal_id): Path<String>,
) -> axum::response::Response {
    match parse_principal(&principal_id) {
        Ok(id) => roles_response(&services, id).await,
        Err(res) => res,
    }
}

/// POST /admin/principals/:principal_id/roles  `{ "role": "Staff" }`
pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Path(principal_id): Path<String>,
    Json(body): Json<AssignRoleRequest>,
) -> axum::response::Response {
    let principal_id = match parse_principal(&principal_id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let role = Role::new(body.role.trim().to_string());
    if !services.roles.catalog().contains_role(&role) {
        return errors::bad_request("UNKNOWN_ROLE", format!("role '{role}' is not defined"));
    }
    if let Err(res) = ensure_may_change(&services, &identity, "roles.assign", principal_id, &role).await {
        return res;
    }

    if let Err(e) = services.roles.assign_role(principal_id, &role).await {
        return errors::store_error_to_response(e);
    }
    audit_change(&services, &identity, "roles.assign", principal_id, &role).await;
    roles_response(&services, principal_id).await
}

/// DELETE /admin/principals/:principal_id/roles/:role
pub async fn remove_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Path((principal_id, role)): Path<(String, String)>,
) -> axum::response::Response {
    let principal_id = match parse_principal(&principal_id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let role = Role::new(role);
    if let Err(res) = ensure_may_change(&services, &identity, "roles.remove", principal_id, &role).await {
        return res;
    }

    if let Err(e) = services.roles.remove_role(principal_id, &role).await {
        return errors::store_error_to_response(e);
    }
    audit_change(&services, &identity, "roles.remove", principal_id, &role).await;
    roles_response(&services, principal_id).await
}

/// Only an Admin may grant or revoke an admin role, whatever permissions
/// the catalog attaches to `MANAGE_USERS`.
async fn ensure_may_change(
    services: &AppServices,
    identity: &IdentityContext,
    action: &str,
    principal_id: PrincipalId,
    role: &Role,
) -> Result<(), axum::response::Response> {
    if !role.is_admin() || identity.roles.iter().any(Role::is_admin) {
        return Ok(());
    }

    let reason = DenyReason::InsufficientRole;
    let details = json!({ "role": role.as_str(), "target": principal_id.to_string() });
    if let Err(e) = services
        .audit
        .record_denial(identity, action, reason, Some(details))
        .await
    {
        tracing::error!(error = %e, action, %principal_id, "failed to audit refused role change");
    }
    Err(errors::denial_response(&Denial::new(reason)))
}

async fn audit_change(
    services: &AppServices,
    identity: &IdentityContext,
    action: &str,
    principal_id: PrincipalId,
    role: &Role,
) {
    let details = json!({ "role": role.as_str() });
    if let Err(e) = services
        .audit
        .record_action(identity, action, Some(principal_id.to_string()), Some(details))
        .await
    {
        tracing::error!(error = %e, action, %principal_id, "failed to audit role change");
    }
}
