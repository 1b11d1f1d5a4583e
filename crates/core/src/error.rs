use thiserror::Error;

/// A string could not be parsed into one of the typed identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {reason}")]
pub struct InvalidId {
    /// Identifier type name, e.g. `PrincipalId`.
    pub kind: &'static str,
    pub reason: String,
}
