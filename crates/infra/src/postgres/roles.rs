use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use storefront_auth::{PrincipalId, Role, RoleCatalog, RoleStore, StoreError};

use super::map_sqlx_error;

/// Role assignments in the `role_assignments` table.
///
/// Role definitions stay in the in-process [`RoleCatalog`]; only the
/// principal → role edges are persisted. Rows naming a role the catalog no
/// longer defines are skipped on read.
#[derive(Debug, Clone)]
pub struct PostgresRoleStore {
    pool: Arc<PgPool>,
    catalog: RoleCatalog,
}

impl PostgresRoleStore {
    pub fn new(pool: PgPool, catalog: RoleCatalog) -> Self {
        Self {
            pool: Arc::new(pool),
            catalog,
        }
    }
}

#[async_trait]
impl RoleStore for PostgresRoleStore {
    fn catalog(&self) -> &RoleCatalog {
        &self.catalog
    }

    #[instrument(skip(self), fields(principal_id = %principal_id), err)]
    async fn roles_of(&self, principal_id: PrincipalId) -> Result<BTreeSet<Role>, StoreError> {
        let rows = sqlx::query("SELECT role_name FROM role_assignments WHERE principal_id = $1")
            .bind(principal_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("roles_of", e))?;

        let mut roles = BTreeSet::new();
        for row in rows {
            let name: String = row
                .try_get("role_name")
                .map_err(|e| map_sqlx_error("roles_of", e))?;
            let role = Role::new(name);
            if self.catalog.contains_role(&role) {
                roles.insert(role);
            } else {
                tracing::warn!(%principal_id, role = %role, "skipping assignment of undefined role");
            }
        }
        Ok(roles)
    }

    #[instrument(skip(self), fields(principal_id = %principal_id, role = %role), err)]
    async fn insert_assignment(&self, principal_id: PrincipalId, role: &Role) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO role_assignments (principal_id, role_name)
            VALUES ($1, $2)
            ON CONFLICT (principal_id, role_name) DO NOTHING
            "#,
        )
        .bind(principal_id.as_uuid())
        .bind(role.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_assignment", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(principal_id = %principal_id, role = %role), err)]
    async fn delete_assignment(&self, principal_id: PrincipalId, role: &Role) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM role_assignments WHERE principal_id = $1 AND role_name = $2")
            .bind(principal_id.as_uuid())
            .bind(role.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_assignment", e))?;
        Ok(())
    }
}
