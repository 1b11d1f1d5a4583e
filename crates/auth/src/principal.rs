use serde::{Deserialize, Serialize};

use storefront_core::PrincipalId;

/// An account subject to authorization checks.
///
/// Created at registration (outside this crate); read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub active: bool,
}

impl Principal {
    pub fn active(id: PrincipalId) -> Self {
        Self { id, active: true }
    }

    pub fn inactive(id: PrincipalId) -> Self {
        Self { id, active: false }
    }
}
