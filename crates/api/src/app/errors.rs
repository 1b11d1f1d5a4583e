use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use storefront_auth::{Denial, MfaError, StoreError};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "status": "error",
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Guard denial → HTTP. Only the generic reason text reaches the caller.
pub fn denial_response(denial: &Denial) -> axum::response::Response {
    let status = StatusCode::from_u16(denial.reason.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_error(status, denial.reason.code(), denial.reason.to_string())
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    tracing::error!(error = %err, "store failure");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "STORE_ERROR",
        "internal server error",
    )
}

pub fn mfa_error_to_response(err: MfaError) -> axum::response::Response {
    match err {
        MfaError::InvalidCode => json_error(StatusCode::BAD_REQUEST, "MFA_INVALID_CODE", err.to_string()),
        MfaError::SetupExpired => {
            json_error(StatusCode::REQUEST_TIMEOUT, "MFA_SETUP_EXPIRED", err.to_string())
        }
        MfaError::AlreadyEnrolled => json_error(StatusCode::CONFLICT, "MFA_ALREADY_ENROLLED", err.to_string()),
        MfaError::CodeRequired => json_error(StatusCode::BAD_REQUEST, "MFA_CODE_REQUIRED", err.to_string()),
        MfaError::Crypto(_) | MfaError::Render(_) | MfaError::Store(_) => {
            tracing::error!(error = %err, "mfa failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "MFA_ERROR",
                "internal server error",
            )
        }
    }
}

pub fn bad_request(code: &'static str, message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, code, message)
}
