use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use storefront_auth::{EnrollmentStore, MfaEnrollment, PrincipalId, StoreError};

use super::map_sqlx_error;

/// Enabled MFA enrollments in `mfa_enrollments`. Secrets arrive already
/// encrypted and are stored as opaque bytes.
#[derive(Debug, Clone)]
pub struct PostgresEnrollmentStore {
    pool: Arc<PgPool>,
}

impl PostgresEnrollmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl EnrollmentStore for PostgresEnrollmentStore {
    #[instrument(skip(self), fields(principal_id = %principal_id), err)]
    async fn get(&self, principal_id: PrincipalId) -> Result<Option<MfaEnrollment>, StoreError> {
        let row = sqlx::query(
            "SELECT secret, enabled, enrolled_at FROM mfa_enrollments WHERE principal_id = $1",
        )
        .bind(principal_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_enrollment", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let secret: Vec<u8> = row.try_get("secret").map_err(|e| map_sqlx_error("get_enrollment", e))?;
        let enabled: bool = row.try_get("enabled").map_err(|e| map_sqlx_error("get_enrollment", e))?;
        let enrolled_at: DateTime<Utc> = row
            .try_get("enrolled_at")
            .map_err(|e| map_sqlx_error("get_enrollment", e))?;

        Ok(Some(MfaEnrollment {
            principal_id,
            secret,
            enabled,
            enrolled_at,
        }))
    }

    /// Single conditional upsert: an enabled row is never overwritten.
    #[instrument(skip(self, enrollment), fields(principal_id = %enrollment.principal_id), err)]
    async fn enable(&self, enrollment: MfaEnrollment) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO mfa_enrollments (principal_id, secret, enabled, enrolled_at)
            VALUES ($1, $2, TRUE, $3)
            ON CONFLICT (principal_id) DO UPDATE
                SET secret = EXCLUDED.secret,
                    enabled = TRUE,
                    enrolled_at = EXCLUDED.enrolled_at
                WHERE mfa_enrollments.enabled = FALSE
            "#,
        )
        .bind(enrollment.principal_id.as_uuid())
        .bind(&enrollment.secret)
        .bind(enrollment.enrolled_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("enable_enrollment", e))?;

        Ok(result.rows_affected() == 1)
    }
}
