use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles map to permission sets through the [`RoleCatalog`](crate::RoleCatalog).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Full administrator; bypasses permission requirements.
    pub const ADMIN: Role = Role::from_static("Admin");
    /// Back-office staff.
    pub const STAFF: Role = Role::from_static("Staff");
    /// Business customer with access to quotes and trade pricing.
    pub const B2B: Role = Role::from_static("B2B");
    pub const CUSTOMER: Role = Role::from_static("Customer");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        *self == Self::ADMIN
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
