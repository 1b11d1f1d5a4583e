//! Denial taxonomy and store failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the guard pipeline refused a request.
///
/// The `Display` text is safe to return to callers; diagnostic detail lives
/// in [`Denial::detail`] and only reaches logs and the audit trail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    #[error("authentication required")]
    Unauthenticated,

    #[error("account is inactive")]
    AccountInactive,

    #[error("CSRF token missing")]
    CsrfMissing,

    #[error("CSRF token invalid")]
    CsrfInvalid,

    #[error("multi-factor authentication code required")]
    MfaRequired,

    #[error("MFA setup expired, please restart setup")]
    MfaSetupExpired,

    #[error("invalid MFA code")]
    MfaInvalidCode,

    #[error("insufficient permissions")]
    InsufficientPermissions,

    #[error("insufficient role")]
    InsufficientRole,

    #[error("internal server error")]
    InternalGuardFault,
}

impl DenyReason {
    /// Stable machine-readable code, as stored in audit records.
    pub fn code(self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "UNAUTHENTICATED",
            DenyReason::AccountInactive => "ACCOUNT_INACTIVE",
            DenyReason::CsrfMissing => "CSRF_MISSING",
            DenyReason::CsrfInvalid => "CSRF_INVALID",
            DenyReason::MfaRequired => "MFA_REQUIRED",
            DenyReason::MfaSetupExpired => "MFA_SETUP_EXPIRED",
            DenyReason::MfaInvalidCode => "MFA_INVALID_CODE",
            DenyReason::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            DenyReason::InsufficientRole => "INSUFFICIENT_ROLE",
            DenyReason::InternalGuardFault => "INTERNAL_GUARD_FAULT",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let reason = match code {
            "UNAUTHENTICATED" => DenyReason::Unauthenticated,
            "ACCOUNT_INACTIVE" => DenyReason::AccountInactive,
            "CSRF_MISSING" => DenyReason::CsrfMissing,
            "CSRF_INVALID" => DenyReason::CsrfInvalid,
            "MFA_REQUIRED" => DenyReason::MfaRequired,
            "MFA_SETUP_EXPIRED" => DenyReason::MfaSetupExpired,
            "MFA_INVALID_CODE" => DenyReason::MfaInvalidCode,
            "INSUFFICIENT_PERMISSIONS" => DenyReason::InsufficientPermissions,
            "INSUFFICIENT_ROLE" => DenyReason::InsufficientRole,
            "INTERNAL_GUARD_FAULT" => DenyReason::InternalGuardFault,
            _ => return None,
        };
        Some(reason)
    }

    /// HTTP status the transport layer should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            DenyReason::Unauthenticated | DenyReason::AccountInactive | DenyReason::MfaRequired => 401,
            DenyReason::CsrfMissing
            | DenyReason::CsrfInvalid
            | DenyReason::InsufficientPermissions
            | DenyReason::InsufficientRole => 403,
            DenyReason::MfaInvalidCode => 400,
            DenyReason::MfaSetupExpired => 408,
            DenyReason::InternalGuardFault => 500,
        }
    }
}

/// A denial produced by one of the guard stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenyReason,
    /// Server-side diagnostic detail (never sent to the caller).
    pub detail: Option<String>,
}

impl Denial {
    pub fn new(reason: DenyReason) -> Self {
        Self { reason, detail: None }
    }

    pub fn with_detail(reason: DenyReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: Some(detail.into()),
        }
    }

    pub fn fault(detail: impl Into<String>) -> Self {
        Self::with_detail(DenyReason::InternalGuardFault, detail)
    }
}

impl From<DenyReason> for Denial {
    fn from(reason: DenyReason) -> Self {
        Self::new(reason)
    }
}

impl From<StoreError> for Denial {
    fn from(err: StoreError) -> Self {
        Self::fault(err.to_string())
    }
}

impl core::fmt::Display for Denial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({})", self.reason.code(), detail),
            None => f.write_str(self.reason.code()),
        }
    }
}

/// Failure of a backing store (role assignments, principals, enrollments, audit).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        Self::Unavailable(format!("{what} lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_for_every_reason() {
        let all = [
            DenyReason::Unauthenticated,
            DenyReason::AccountInactive,
            DenyReason::CsrfMissing,
            DenyReason::CsrfInvalid,
            DenyReason::MfaRequired,
            DenyReason::MfaSetupExpired,
            DenyReason::MfaInvalidCode,
            DenyReason::InsufficientPermissions,
            DenyReason::InsufficientRole,
            DenyReason::InternalGuardFault,
        ];
        for reason in all {
            assert_eq!(DenyReason::from_code(reason.code()), Some(reason));
            let json = serde_json::to_value(reason).unwrap();
            assert_eq!(json, reason.code());
        }
    }

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(DenyReason::Unauthenticated.http_status(), 401);
        assert_eq!(DenyReason::AccountInactive.http_status(), 401);
        assert_eq!(DenyReason::CsrfInvalid.http_status(), 403);
        assert_eq!(DenyReason::MfaSetupExpired.http_status(), 408);
        assert_eq!(DenyReason::MfaInvalidCode.http_status(), 400);
        assert_eq!(DenyReason::InsufficientRole.http_status(), 403);
        assert_eq!(DenyReason::InternalGuardFault.http_status(), 500);
    }

    #[test]
    fn internal_detail_is_not_part_of_public_message() {
        let denial = Denial::fault("connection refused to 10.0.0.4");
        assert_eq!(denial.reason.to_string(), "internal server error");
        assert!(denial.to_string().contains("10.0.0.4"));
    }
}
