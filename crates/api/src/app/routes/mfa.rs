//! TOTP enrollment endpoints.

use std::sync::Arc;

use axum::{
    Extension, Json,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use storefront_auth::IdentityContext;

use crate::app::{errors, services::AppServices};

pub const MFA_SECRET_HEADER: &str = "x-mfa-secret";

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

/// POST /mfa/setup - start (or restart) enrollment; responds with the QR code.
pub async fn setup(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    let setup = match services.mfa.begin_setup(identity.principal_id(), Utc::now()) {
        Ok(s) => s,
        Err(e) => return errors::mfa_error_to_response(e),
    };

    let Ok(secret) = HeaderValue::from_str(&setup.secret) else {
        return errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "MFA_ERROR",
            "internal server error",
        );
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/svg+xml")),
            (header::HeaderName::from_static(MFA_SECRET_HEADER), secret),
        ],
        setup.qr_svg,
    )
        .into_response()
}

/// POST /mfa/verify - confirm the pending setup with a TOTP code.
pub async fn verify(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Json(body): Json<VerifyRequest>,
) -> axum::response::Response {
    let principal_id = identity.principal_id();
    if let Err(e) = services
        .mfa
        .confirm_setup(principal_id, body.token.trim(), Utc::now())
        .await
    {
        let details = json!({ "error": e.to_string() });
        if let Err(audit_err) = services
            .audit
            .record_denial(&identity, "mfa.verify", e.deny_reason(), Some(details))
            .await
        {
            tracing::error!(error = %audit_err, %principal_id, "failed to audit mfa verification failure");
        }
        return errors::mfa_error_to_response(e);
    }

    if let Err(e) = services
        .audit
        .record_action(&identity, "mfa.enrolled", Some(principal_id.to_string()), None)
        .await
    {
        tracing::error!(error = %e, %principal_id, "failed to audit mfa enrollment");
    }

    (
        StatusCode::OK,
        Json(json!({ "message": "MFA has been enabled" })),
    )
        .into_response()
}
