//! Role and permission taxonomy, validated once at startup.
//!
//! Role definitions and guard requirements are checked against the known
//! permission names so a typo fails at load time instead of silently
//! granting nothing.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::permissions::storefront as perms;
use crate::{Permission, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("role '{role}' references unknown permission '{permission}'")]
    UnknownPermission { role: String, permission: String },

    #[error("role '{0}' is defined more than once")]
    DuplicateRole(String),

    #[error("requirement references unknown permission '{0}'")]
    UnknownRequiredPermission(String),

    #[error("requirement references undefined role '{0}'")]
    UnknownRequiredRole(String),

    #[error("requirement lists no roles or permissions")]
    EmptyRequirement,
}

/// Immutable mapping of role → permission set plus the known permission names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCatalog {
    permissions: BTreeSet<Permission>,
    roles: BTreeMap<Role, BTreeSet<Permission>>,
}

impl RoleCatalog {
    pub fn builder() -> RoleCatalogBuilder {
        RoleCatalogBuilder::default()
    }

    /// Built-in storefront roles.
    pub fn storefront_default() -> Self {
        // Built from constants; cannot reference unknown permissions.
        let mut roles = BTreeMap::new();
        roles.insert(Role::ADMIN, perms::ALL.into_iter().collect());
        roles.insert(
            Role::STAFF,
            BTreeSet::from([perms::VIEW_REPORTS, perms::PROCESS_ORDERS]),
        );
        roles.insert(
            Role::B2B,
            BTreeSet::from([perms::REQUEST_QUOTES, perms::VIEW_B2B_PRICING]),
        );
        roles.insert(Role::CUSTOMER, BTreeSet::from([perms::WRITE_REVIEWS]));

        Self {
            permissions: perms::ALL.into_iter().collect(),
            roles,
        }
    }

    pub fn contains_role(&self, role: &Role) -> bool {
        self.roles.contains_key(role)
    }

    pub fn contains_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    /// Permissions granted by `role`; empty when the role is undefined.
    pub fn permissions_of(&self, role: &Role) -> BTreeSet<Permission> {
        self.roles.get(role).cloned().unwrap_or_default()
    }

    /// Union of the permissions granted by every role in `roles`.
    pub fn effective_permissions<'a>(
        &self,
        roles: impl IntoIterator<Item = &'a Role>,
    ) -> BTreeSet<Permission> {
        roles
            .into_iter()
            .filter_map(|role| self.roles.get(role))
            .flat_map(|perms| perms.iter().cloned())
            .collect()
    }

    /// `true` iff the roles include `Admin` or jointly grant every permission.
    pub fn grants_all<'a>(
        &self,
        roles: impl IntoIterator<Item = &'a Role> + Clone,
        required: &[Permission],
    ) -> bool {
        if roles.clone().into_iter().any(Role::is_admin) {
            return true;
        }
        let effective = self.effective_permissions(roles);
        required.iter().all(|p| effective.contains(p))
    }

    pub fn roles(&self) -> impl Iterator<Item = (&Role, &BTreeSet<Permission>)> {
        self.roles.iter()
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    /// Display-oriented snapshot for admin tooling.
    pub fn describe(&self) -> CatalogView {
        CatalogView {
            roles: self
                .roles
                .iter()
                .map(|(role, perms)| RoleDefinition {
                    name: role.as_str().to_string(),
                    permissions: perms.iter().map(|p| p.as_str().to_string()).collect(),
                    description: role_description(role),
                })
                .collect(),
            permissions: self
                .permissions
                .iter()
                .map(|p| PermissionDefinition {
                    name: p.as_str().to_string(),
                    category: p.category().to_lowercase(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RoleCatalogBuilder {
    permissions: BTreeSet<Permission>,
    roles: Vec<(Role, Vec<Permission>)>,
}

impl RoleCatalogBuilder {
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    pub fn permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions.extend(permissions);
        self
    }

    pub fn role(mut self, role: Role, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.roles.push((role, permissions.into_iter().collect()));
        self
    }

    pub fn build(self) -> Result<RoleCatalog, CatalogError> {
        let mut roles = BTreeMap::new();
        for (role, granted) in self.roles {
            if let Some(unknown) = granted.iter().find(|p| !self.permissions.contains(*p)) {
                return Err(CatalogError::UnknownPermission {
                    role: role.to_string(),
                    permission: unknown.to_string(),
                });
            }
            if roles.contains_key(&role) {
                return Err(CatalogError::DuplicateRole(role.to_string()));
            }
            roles.insert(role, granted.into_iter().collect());
        }

        Ok(RoleCatalog {
            permissions: self.permissions,
            roles,
        })
    }
}

/// Role definition with its granted permissions (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct RoleDefinition {
    pub name: String,
    pub permissions: Vec<String>,
    pub description: Option<String>,
}

/// Permission definition (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct PermissionDefinition {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogView {
    pub roles: Vec<RoleDefinition>,
    pub permissions: Vec<PermissionDefinition>,
}

fn role_description(role: &Role) -> Option<String> {
    let text = match role.as_str() {
        "Admin" => "Full administrator; bypasses permission checks",
        "Staff" => "Back-office staff with reporting and order processing access",
        "B2B" => "Business customer with quotes and trade pricing",
        "Customer" => "Retail customer",
        _ => return None,
    };
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_matches_storefront_roles() {
        let catalog = RoleCatalog::storefront_default();

        assert_eq!(
            catalog.permissions_of(&Role::STAFF),
            BTreeSet::from([perms::VIEW_REPORTS, perms::PROCESS_ORDERS])
        );
        assert_eq!(catalog.permissions_of(&Role::ADMIN).len(), perms::ALL.len());
        assert!(catalog.permissions_of(&Role::new("Ghost")).is_empty());
    }

    #[test]
    fn unknown_permission_is_rejected_at_build_time() {
        let err = RoleCatalog::builder()
            .permission(perms::VIEW_REPORTS)
            .role(Role::STAFF, [perms::VIEW_REPORTS, Permission::new("VIEW_REPROTS")])
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            CatalogError::UnknownPermission {
                role: "Staff".into(),
                permission: "VIEW_REPROTS".into(),
            }
        );
    }

    #[test]
    fn duplicate_role_is_rejected() {
        let err = RoleCatalog::builder()
            .permission(perms::VIEW_REPORTS)
            .role(Role::STAFF, [perms::VIEW_REPORTS])
            .role(Role::STAFF, Vec::<Permission>::new())
            .build()
            .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateRole("Staff".into()));
    }

    #[test]
    fn admin_grants_everything_even_without_permissions() {
        let catalog = RoleCatalog::builder()
            .permission(perms::MANAGE_PRODUCTS)
            .role(Role::ADMIN, Vec::<Permission>::new())
            .build()
            .unwrap();

        let roles = [Role::ADMIN];
        assert!(catalog.grants_all(roles.iter(), &[perms::MANAGE_PRODUCTS]));
        assert!(catalog.effective_permissions(roles.iter()).is_empty());
    }

    #[test]
    fn describe_lists_roles_with_descriptions() {
        let view = RoleCatalog::storefront_default().describe();
        let staff = view.roles.iter().find(|r| r.name == "Staff").unwrap();
        assert!(staff.description.is_some());
        assert!(staff.permissions.contains(&"PROCESS_ORDERS".to_string()));
        assert!(view.permissions.iter().any(|p| p.category == "manage"));
    }
}
