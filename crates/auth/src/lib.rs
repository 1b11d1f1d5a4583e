//! `storefront-auth`: request authorization pipeline (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage engines: the
//! stores it consults are traits with in-memory implementations here and
//! database-backed ones in `storefront-infra`.

pub mod audit;
pub mod authorize;
pub mod catalog;
pub mod claims;
pub mod csrf;
pub mod error;
pub mod guard;
pub mod identity;
pub mod mfa;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod store;

pub use audit::{
    AuditEmitter, AuditLog, AuditPage, AuditQuery, AuditRecord, AuditSortField, InMemoryAuditLog,
    Outcome, SortDirection,
};
pub use authorize::{AuthorizationExplanation, explain_authorization};
pub use catalog::{CatalogError, RoleCatalog};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use csrf::{CsrfToken, CsrfValidator};
pub use error::{Denial, DenyReason, StoreError};
pub use guard::{Credential, GuardComposer, GuardRequest, Requirement, Stage};
pub use identity::{IdentityContext, IdentityResolver, InMemoryPrincipalDirectory, PrincipalDirectory};
pub use mfa::{
    EnrollmentStore, InMemoryEnrollmentStore, MfaEnrollment, MfaError, MfaGate, MfaSetup, SecretCipher,
};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
pub use store::{InMemoryRoleStore, RoleStore};

pub use storefront_core::{PrincipalId, RequestId};
