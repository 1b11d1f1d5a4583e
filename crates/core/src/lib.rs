//! `storefront-core`: shared building blocks for the storefront backend.
//!
//! This crate contains typed identifiers and their parse error only (no IO).

pub mod error;
pub mod id;

pub use error::InvalidId;
pub use id::{AuditRecordId, PrincipalId, RequestId};
