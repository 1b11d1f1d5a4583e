//! Postgres-backed implementations of the authorization stores.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | StoreError | Scenario |
//! |------------|------------|----------|
//! | Decode / ColumnDecode / ColumnNotFound | `Corrupt` | Row does not match the expected schema |
//! | Database | `Unavailable` | Constraint or server-side failure |
//! | PoolClosed / PoolTimedOut / Io / Tls / other | `Unavailable` | Connection-level failure |
//!
//! ## Thread Safety
//!
//! Every store wraps the shared SQLx pool, which is `Send + Sync`; each
//! operation is a single statement, so no store holds a transaction open.

mod audit;
mod enrollments;
mod principals;
mod roles;

pub use audit::PostgresAuditLog;
pub use enrollments::PostgresEnrollmentStore;
pub use principals::PostgresPrincipalDirectory;
pub use roles::PostgresRoleStore;

use anyhow::Context;
use sqlx::PgPool;

use storefront_auth::StoreError;

const SCHEMA: &[(&str, &str)] = &[
    (
        "principals",
        r#"
        CREATE TABLE IF NOT EXISTS principals (
            id         UUID PRIMARY KEY,
            active     BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "role_assignments",
        r#"
        CREATE TABLE IF NOT EXISTS role_assignments (
            principal_id UUID NOT NULL,
            role_name    TEXT NOT NULL,
            assigned_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (principal_id, role_name)
        )
        "#,
    ),
    (
        "mfa_enrollments",
        r#"
        CREATE TABLE IF NOT EXISTS mfa_enrollments (
            principal_id UUID PRIMARY KEY,
            secret       BYTEA NOT NULL,
            enabled      BOOLEAN NOT NULL,
            enrolled_at  TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "audit_logs",
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id         UUID PRIMARY KEY,
            actor_id   UUID NULL,
            action     TEXT NOT NULL,
            endpoint   TEXT NOT NULL,
            outcome    TEXT NOT NULL,
            reason     TEXT NULL,
            target     TEXT NULL,
            details    JSONB NULL,
            ip         TEXT NULL,
            request_id UUID NOT NULL,
            timestamp  TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "audit_logs_actor_idx",
        "CREATE INDEX IF NOT EXISTS audit_logs_actor_idx ON audit_logs (actor_id, timestamp DESC)",
    ),
];

/// Connect to Postgres and make sure the tables the stores use exist.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

pub async fn ensure_schema(pool: &PgPool) -> anyhow::Result<()> {
    for (name, ddl) in SCHEMA {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .with_context(|| format!("failed to create {name}"))?;
    }
    tracing::info!(tables = SCHEMA.len(), "postgres schema ready");
    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Decode(e) => StoreError::corrupt(format!("decode error in {operation}: {e}")),
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::corrupt(format!("column {index} in {operation}: {source}"))
        }
        sqlx::Error::ColumnNotFound(column) => {
            StoreError::corrupt(format!("missing column {column} in {operation}"))
        }
        sqlx::Error::Database(db_err) => StoreError::unavailable(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::PoolClosed => StoreError::unavailable(format!("connection pool closed in {operation}")),
        other => StoreError::unavailable(format!("sqlx error in {operation}: {other}")),
    }
}
