//! Role-permission store: principal → roles, role → permissions.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use storefront_core::PrincipalId;

use crate::{Permission, Role, RoleCatalog, StoreError};

/// Role assignment store.
///
/// Implementations only persist assignments; role definitions come from the
/// [`RoleCatalog`]. Lookups always read current state (no caching layer), so
/// an evaluation never sees assignments older than the latest change.
#[async_trait]
pub trait RoleStore: Send + Sync {
    fn catalog(&self) -> &RoleCatalog;

    /// Roles assigned to `principal_id`; empty for an unknown principal.
    async fn roles_of(&self, principal_id: PrincipalId) -> Result<BTreeSet<Role>, StoreError>;

    /// Insert the assignment if absent.
    async fn insert_assignment(&self, principal_id: PrincipalId, role: &Role) -> Result<(), StoreError>;

    /// Delete the assignment if present.
    async fn delete_assignment(&self, principal_id: PrincipalId, role: &Role) -> Result<(), StoreError>;

    /// Permissions granted by `role`; empty when the role is undefined.
    async fn permissions_of(&self, role: &Role) -> Result<BTreeSet<Permission>, StoreError> {
        Ok(self.catalog().permissions_of(role))
    }

    async fn has_role(&self, principal_id: PrincipalId, role: &Role) -> Result<bool, StoreError> {
        Ok(self.roles_of(principal_id).await?.contains(role))
    }

    async fn has_permission(
        &self,
        principal_id: PrincipalId,
        permission: &Permission,
    ) -> Result<bool, StoreError> {
        let roles = self.roles_of(principal_id).await?;
        Ok(self.catalog().effective_permissions(&roles).contains(permission))
    }

    /// Conjunction of [`has_permission`](Self::has_permission), with the
    /// `Admin` role granting everything.
    async fn has_all_permissions(
        &self,
        principal_id: PrincipalId,
        required: &[Permission],
    ) -> Result<bool, StoreError> {
        let roles = self.roles_of(principal_id).await?;
        Ok(self.catalog().grants_all(&roles, required))
    }

    /// Idempotent. Assigning a role the catalog does not define is a no-op.
    async fn assign_role(&self, principal_id: PrincipalId, role: &Role) -> Result<(), StoreError> {
        if !self.catalog().contains_role(role) {
            tracing::warn!(%principal_id, role = %role, "ignoring assignment of undefined role");
            return Ok(());
        }
        self.insert_assignment(principal_id, role).await?;
        tracing::info!(%principal_id, role = %role, "role assigned");
        Ok(())
    }

    /// Idempotent; removing an unassigned role is a no-op.
    async fn remove_role(&self, principal_id: PrincipalId, role: &Role) -> Result<(), StoreError> {
        self.delete_assignment(principal_id, role).await?;
        tracing::info!(%principal_id, role = %role, "role removed");
        Ok(())
    }
}

#[async_trait]
impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    fn catalog(&self) -> &RoleCatalog {
        (**self).catalog()
    }

    async fn roles_of(&self, principal_id: PrincipalId) -> Result<BTreeSet<Role>, StoreError> {
        (**self).roles_of(principal_id).await
    }

    async fn insert_assignment(&self, principal_id: PrincipalId, role: &Role) -> Result<(), StoreError> {
        (**self).insert_assignment(principal_id, role).await
    }

    async fn delete_assignment(&self, principal_id: PrincipalId, role: &Role) -> Result<(), StoreError> {
        (**self).delete_assignment(principal_id, role).await
    }
}

/// In-memory role store for tests/dev.
#[derive(Debug)]
pub struct InMemoryRoleStore {
    catalog: RoleCatalog,
    assignments: RwLock<HashMap<PrincipalId, BTreeSet<Role>>>,
}

impl InMemoryRoleStore {
    pub fn new(catalog: RoleCatalog) -> Self {
        Self {
            catalog,
            assignments: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    fn catalog(&self) -> &RoleCatalog {
        &self.catalog
    }

    async fn roles_of(&self, principal_id: PrincipalId) -> Result<BTreeSet<Role>, StoreError> {
        let map = self
            .assignments
            .read()
            .map_err(|_| StoreError::poisoned("role assignment"))?;
        Ok(map.get(&principal_id).cloned().unwrap_or_default())
    }

    async fn insert_assignment(&self, principal_id: PrincipalId, role: &Role) -> Result<(), StoreError> {
        let mut map = self
            .assignments
            .write()
            .map_err(|_| StoreError::poisoned("role assignment"))?;
        map.entry(principal_id).or_default().insert(role.clone());
        Ok(())
    }

    async fn delete_assignment(&self, principal_id: PrincipalId, role: &Role) -> Result<(), StoreError> {
        let mut map = self
            .assignments
            .write()
            .map_err(|_| StoreError::poisoned("role assignment"))?;
        if let Some(roles) = map.get_mut(&principal_id) {
            roles.remove(role);
            if roles.is_empty() {
                map.remove(&principal_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::storefront as perms;
    use proptest::prelude::*;

    fn store() -> InMemoryRoleStore {
        InMemoryRoleStore::new(RoleCatalog::storefront_default())
    }

    #[tokio::test]
    async fn unknown_principal_has_no_roles() {
        let store = store();
        assert!(store.roles_of(PrincipalId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn assignment_is_idempotent() {
        let store = store();
        let p = PrincipalId::new();

        store.assign_role(p, &Role::STAFF).await.unwrap();
        let once = store.roles_of(p).await.unwrap();
        store.assign_role(p, &Role::STAFF).await.unwrap();
        let twice = store.roles_of(p).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice, BTreeSet::from([Role::STAFF]));
    }

    #[tokio::test]
    async fn removing_unassigned_role_is_noop() {
        let store = store();
        let p = PrincipalId::new();
        store.assign_role(p, &Role::CUSTOMER).await.unwrap();

        store.remove_role(p, &Role::STAFF).await.unwrap();
        assert_eq!(store.roles_of(p).await.unwrap(), BTreeSet::from([Role::CUSTOMER]));

        store.remove_role(p, &Role::CUSTOMER).await.unwrap();
        store.remove_role(p, &Role::CUSTOMER).await.unwrap();
        assert!(store.roles_of(p).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn undefined_role_assignment_is_ignored() {
        let store = store();
        let p = PrincipalId::new();
        store.assign_role(p, &Role::new("Wizard")).await.unwrap();
        assert!(store.roles_of(p).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn permission_checks_follow_assigned_roles() {
        let store = store();
        let p = PrincipalId::new();
        store.assign_role(p, &Role::STAFF).await.unwrap();

        assert!(store.has_role(p, &Role::STAFF).await.unwrap());
        assert!(!store.has_role(p, &Role::ADMIN).await.unwrap());
        assert!(store.has_permission(p, &perms::PROCESS_ORDERS).await.unwrap());
        assert!(!store.has_permission(p, &perms::MANAGE_PRODUCTS).await.unwrap());
        assert!(
            store
                .has_all_permissions(p, &[perms::VIEW_REPORTS, perms::PROCESS_ORDERS])
                .await
                .unwrap()
        );
        assert!(
            !store
                .has_all_permissions(p, &[perms::VIEW_REPORTS, perms::MANAGE_PRODUCTS])
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn removal_is_visible_to_the_next_evaluation() {
        let store = store();
        let p = PrincipalId::new();
        store.assign_role(p, &Role::STAFF).await.unwrap();
        assert!(store.has_permission(p, &perms::VIEW_REPORTS).await.unwrap());

        store.remove_role(p, &Role::STAFF).await.unwrap();
        assert!(!store.has_permission(p, &perms::VIEW_REPORTS).await.unwrap());
    }

    fn role_strategy() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::ADMIN),
            Just(Role::STAFF),
            Just(Role::B2B),
            Just(Role::CUSTOMER),
            Just(Role::new("Undefined")),
        ]
    }

    fn permission_strategy() -> impl Strategy<Value = Permission> {
        (0..perms::ALL.len()).prop_map(|i| perms::ALL[i].clone())
    }

    proptest! {
        #[test]
        fn has_all_permissions_matches_union_or_admin(
            roles in prop::collection::btree_set(role_strategy(), 0..4),
            required in prop::collection::vec(permission_strategy(), 0..6),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = store();
            let p = PrincipalId::new();

            let granted = rt.block_on(async {
                for role in &roles {
                    store.assign_role(p, role).await.unwrap();
                }
                store.has_all_permissions(p, &required).await.unwrap()
            });

            let catalog = RoleCatalog::storefront_default();
            let union: BTreeSet<Permission> = roles
                .iter()
                .flat_map(|r| catalog.permissions_of(r))
                .collect();
            let expected = roles.contains(&Role::ADMIN)
                || required.iter().all(|perm| union.contains(perm));

            prop_assert_eq!(granted, expected);
        }
    }
}
