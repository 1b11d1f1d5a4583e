use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use storefront_auth::{
    AuditLog, AuditPage, AuditQuery, AuditRecord, AuditSortField, DenyReason, Outcome,
    SortDirection, StoreError,
};
use storefront_core::{AuditRecordId, PrincipalId, RequestId};

use super::map_sqlx_error;

/// Append-only audit log in the `audit_logs` table.
///
/// The store only ever issues `INSERT` and `SELECT` against the table.
#[derive(Debug, Clone)]
pub struct PostgresAuditLog {
    pool: Arc<PgPool>,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn order_clause(query: &AuditQuery) -> &'static str {
    match (query.sort_by, query.direction) {
        (AuditSortField::Timestamp, SortDirection::Asc) => "timestamp ASC, id ASC",
        (AuditSortField::Timestamp, SortDirection::Desc) => "timestamp DESC, id DESC",
        (AuditSortField::Action, SortDirection::Asc) => "action ASC, id ASC",
        (AuditSortField::Action, SortDirection::Desc) => "action DESC, id DESC",
        (AuditSortField::ActorId, SortDirection::Asc) => "actor_id ASC NULLS FIRST, id ASC",
        (AuditSortField::ActorId, SortDirection::Desc) => "actor_id DESC NULLS LAST, id DESC",
        (AuditSortField::Outcome, SortDirection::Asc) => "outcome ASC, id ASC",
        (AuditSortField::Outcome, SortDirection::Desc) => "outcome DESC, id DESC",
    }
}

fn record_from_row(row: &PgRow) -> Result<AuditRecord, StoreError> {
    let get_err = |e: sqlx::Error| map_sqlx_error("decode_audit_record", e);

    let outcome: String = row.try_get("outcome").map_err(get_err)?;
    let outcome = Outcome::parse(&outcome)
        .ok_or_else(|| StoreError::corrupt(format!("unknown audit outcome '{outcome}'")))?;

    let reason = row
        .try_get::<Option<String>, _>("reason")
        .map_err(get_err)?
        .map(|code| {
            DenyReason::from_code(&code)
                .ok_or_else(|| StoreError::corrupt(format!("unknown deny reason '{code}'")))
        })
        .transpose()?;

    Ok(AuditRecord {
        id: AuditRecordId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get_err)?),
        actor_id: row
            .try_get::<Option<Uuid>, _>("actor_id")
            .map_err(get_err)?
            .map(PrincipalId::from_uuid),
        action: row.try_get("action").map_err(get_err)?,
        endpoint: row.try_get("endpoint").map_err(get_err)?,
        outcome,
        reason,
        target: row.try_get("target").map_err(get_err)?,
        details: row.try_get("details").map_err(get_err)?,
        ip: row.try_get("ip").map_err(get_err)?,
        request_id: RequestId::from_uuid(row.try_get::<Uuid, _>("request_id").map_err(get_err)?),
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp").map_err(get_err)?,
    })
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    #[instrument(skip(self, record), fields(audit_id = %record.id, action = %record.action), err)]
    async fn append(&self, record: AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id,
                actor_id,
                action,
                endpoint,
                outcome,
                reason,
                target,
                details,
                ip,
                request_id,
                timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.actor_id.map(Uuid::from))
        .bind(&record.action)
        .bind(&record.endpoint)
        .bind(record.outcome.as_str())
        .bind(record.reason.map(DenyReason::code))
        .bind(&record.target)
        .bind(&record.details)
        .bind(&record.ip)
        .bind(record.request_id.as_uuid())
        .bind(record.timestamp)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_audit_record", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        let actor_param: Option<Uuid> = query.actor_id.map(Uuid::from);
        let action_param: Option<&str> = query.action.as_deref();

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR actor_id = $1)
                AND ($2::text IS NULL OR action = $2)
                AND ($3::timestamptz IS NULL OR timestamp >= $3)
                AND ($4::timestamptz IS NULL OR timestamp <= $4)
            "#,
        )
        .bind(actor_param)
        .bind(action_param)
        .bind(query.start)
        .bind(query.end)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_audit_records", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_audit_records", e))?;

        // ORDER BY comes from a closed set of literals, never from input.
        let sql = format!(
            r#"
            SELECT id, actor_id, action, endpoint, outcome, reason, target, details, ip, request_id, timestamp
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR actor_id = $1)
                AND ($2::text IS NULL OR action = $2)
                AND ($3::timestamptz IS NULL OR timestamp >= $3)
                AND ($4::timestamptz IS NULL OR timestamp <= $4)
            ORDER BY {}
            LIMIT $5 OFFSET $6
            "#,
            order_clause(query)
        );

        let rows = sqlx::query(&sql)
            .bind(actor_param)
            .bind(action_param)
            .bind(query.start)
            .bind(query.end)
            .bind(i64::from(query.per_page))
            .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_audit_records", e))?;

        let logs = rows.iter().map(record_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(AuditPage::new(logs, u64::try_from(total).unwrap_or(0), query))
    }
}
