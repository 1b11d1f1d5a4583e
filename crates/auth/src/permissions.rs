use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "MANAGE_PRODUCTS"). The set of valid
/// names is fixed by the [`RoleCatalog`](crate::RoleCatalog) loaded at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading segment of the name, used to group permissions for display
    /// ("MANAGE_PRODUCTS" -> "MANAGE").
    pub fn category(&self) -> &str {
        self.as_str().split('_').next().unwrap_or_default()
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storefront permission taxonomy.
pub mod storefront {
    use super::Permission;

    pub const MANAGE_PRODUCTS: Permission = Permission::from_static("MANAGE_PRODUCTS");
    pub const MANAGE_INVENTORY: Permission = Permission::from_static("MANAGE_INVENTORY");
    pub const MANAGE_ORDERS: Permission = Permission::from_static("MANAGE_ORDERS");
    pub const PROCESS_ORDERS: Permission = Permission::from_static("PROCESS_ORDERS");
    pub const VIEW_REPORTS: Permission = Permission::from_static("VIEW_REPORTS");
    pub const MANAGE_USERS: Permission = Permission::from_static("MANAGE_USERS");
    pub const MANAGE_REVIEWS: Permission = Permission::from_static("MANAGE_REVIEWS");
    pub const WRITE_REVIEWS: Permission = Permission::from_static("WRITE_REVIEWS");
    pub const MANAGE_QUOTES: Permission = Permission::from_static("MANAGE_QUOTES");
    pub const REQUEST_QUOTES: Permission = Permission::from_static("REQUEST_QUOTES");
    pub const VIEW_B2B_PRICING: Permission = Permission::from_static("VIEW_B2B_PRICING");
    pub const MANAGE_LOYALTY: Permission = Permission::from_static("MANAGE_LOYALTY");
    pub const MANAGE_NEWSLETTERS: Permission = Permission::from_static("MANAGE_NEWSLETTERS");
    pub const MANAGE_BLOG: Permission = Permission::from_static("MANAGE_BLOG");
    pub const VIEW_AUDIT_LOGS: Permission = Permission::from_static("VIEW_AUDIT_LOGS");

    /// Every permission the storefront knows about.
    pub const ALL: [Permission; 15] = [
        MANAGE_PRODUCTS,
        MANAGE_INVENTORY,
        MANAGE_ORDERS,
        PROCESS_ORDERS,
        VIEW_REPORTS,
        MANAGE_USERS,
        MANAGE_REVIEWS,
        WRITE_REVIEWS,
        MANAGE_QUOTES,
        REQUEST_QUOTES,
        VIEW_B2B_PRICING,
        MANAGE_LOYALTY,
        MANAGE_NEWSLETTERS,
        MANAGE_BLOG,
        VIEW_AUDIT_LOGS,
    ];
}
