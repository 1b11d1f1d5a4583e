use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use storefront_auth::{Principal, PrincipalDirectory, PrincipalId, StoreError};

use super::map_sqlx_error;

/// Read path into the `principals` table.
#[derive(Debug, Clone)]
pub struct PostgresPrincipalDirectory {
    pool: Arc<PgPool>,
}

impl PostgresPrincipalDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl PrincipalDirectory for PostgresPrincipalDirectory {
    #[instrument(skip(self), fields(principal_id = %principal_id), err)]
    async fn find(&self, principal_id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query("SELECT active FROM principals WHERE id = $1")
            .bind(principal_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_principal", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let active: bool = row
            .try_get("active")
            .map_err(|e| map_sqlx_error("find_principal", e))?;

        Ok(Some(Principal {
            id: principal_id,
            active,
        }))
    }

    #[instrument(skip(self), fields(principal_id = %principal.id), err)]
    async fn register(&self, principal: Principal) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO principals (id, active)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET active = EXCLUDED.active
            "#,
        )
        .bind(principal.id.as_uuid())
        .bind(principal.active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_principal", e))?;
        Ok(())
    }
}
