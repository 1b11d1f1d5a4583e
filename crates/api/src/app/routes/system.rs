use std::sync::Arc;

use axum::{Extension, Json, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;

use storefront_auth::IdentityContext;

use crate::app::{errors, services::AppServices};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    let mfa_enabled = match services.mfa.is_required(identity.principal_id()).await {
        Ok(v) => v,
        Err(e) => return errors::store_error_to_response(e),
    };

    Json(json!({
        "principal_id": identity.principal_id().to_string(),
        "roles": identity.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "mfa_enabled": mfa_enabled,
    }))
    .into_response()
}

/// GET /csrf-token - issue a fresh token bound to the caller's session.
pub async fn csrf_token(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.csrf.issue_token(&identity.session_id, Utc::now()) {
        Ok(token) => Json(json!({ "csrf_token": token.value })).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
