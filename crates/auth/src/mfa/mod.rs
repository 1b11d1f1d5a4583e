//! Multi-factor authentication gate (TOTP).
//!
//! Per-principal state machine: `NOT_ENROLLED -> PENDING_SETUP -> ENROLLED`.
//! Pending setups live in memory with a timestamp and never become durable
//! until a code verifies; enrolled secrets are stored encrypted.

mod cipher;
mod gate;
mod store;
pub mod totp;

pub use cipher::SecretCipher;
pub use gate::{MfaGate, MfaSetup};
pub use store::{EnrollmentStore, InMemoryEnrollmentStore, MfaEnrollment};

use thiserror::Error;

use crate::{DenyReason, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MfaError {
    #[error("MFA setup expired or was never started")]
    SetupExpired,

    #[error("invalid MFA code")]
    InvalidCode,

    #[error("MFA code required")]
    CodeRequired,

    #[error("MFA is already enabled for this account")]
    AlreadyEnrolled,

    #[error("MFA secret crypto failure: {0}")]
    Crypto(String),

    #[error("QR code rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MfaError {
    /// Guard-pipeline view of this failure.
    pub fn deny_reason(&self) -> DenyReason {
        match self {
            MfaError::SetupExpired => DenyReason::MfaSetupExpired,
            MfaError::InvalidCode => DenyReason::MfaInvalidCode,
            MfaError::CodeRequired => DenyReason::MfaRequired,
            MfaError::AlreadyEnrolled
            | MfaError::Crypto(_)
            | MfaError::Render(_)
            | MfaError::Store(_) => DenyReason::InternalGuardFault,
        }
    }
}
