//! RBAC inspection endpoints for transparent authorization debugging.
//!
//! These endpoints provide visibility into roles, permissions and the
//! decision the permission stage would make, to help answer "why was this
//! request denied?".

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use storefront_auth::{Permission, PrincipalId, explain_authorization};

use crate::app::{errors, services::AppServices};

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    /// Comma-separated permission names.
    pub permissions: String,
}

/// GET /admin/rbac/roles - roles, their permissions and the permission taxonomy
pub async fn list_roles(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let view = services.roles.catalog().describe();
    (StatusCode::OK, Json(view)).into_response()
}

/// GET /admin/rbac/explain/:principal_id?permissions=A,B
pub async fn explain_principal(
    Extension(services): Extension<Arc<AppServices>>,
    Path(principal_id): Path<String>,
    Query(query): Query<ExplainQuery>,
) -> axum::response::Response {
    let Ok(principal_id) = principal_id.parse::<PrincipalId>() else {
        return errors::bad_request("INVALID_PRINCIPAL_ID", "principal_id must be a UUID");
    };

    let catalog = services.roles.catalog();
    let required: Vec<Permission> = query
        .permissions
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Permission::new(p.to_string()))
        .collect();
    if required.is_empty() {
        return errors::bad_request("INVALID_PERMISSIONS", "at least one permission is required");
    }
    if let Some(unknown) = required.iter().find(|p| !catalog.contains_permission(p)) {
        return errors::bad_request("UNKNOWN_PERMISSION", format!("unknown permission '{unknown}'"));
    }

    let principal = match services.principals.find(principal_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "principal not found"),
        Err(e) => return errors::store_error_to_response(e),
    };
    let roles = match services.roles.roles_of(principal_id).await {
        Ok(r) => r,
        Err(e) => return errors::store_error_to_response(e),
    };

    let explanation = explain_authorization(&principal, &roles, catalog, &required);
    (StatusCode::OK, Json(explanation)).into_response()
}
