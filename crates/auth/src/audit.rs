//! Append-only audit trail of access decisions and privileged actions.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{AuditRecordId, PrincipalId, RequestId};

use crate::{DenyReason, IdentityContext, StoreError};

pub const ACTION_ALLOW: &str = "access.allow";
pub const ACTION_DENY: &str = "access.deny";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allow,
    Deny,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Allow => "allow",
            Outcome::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Outcome::Allow),
            "deny" => Some(Outcome::Deny),
            _ => None,
        }
    }
}

/// Single audit entry. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub actor_id: Option<PrincipalId>,
    pub action: String,
    pub endpoint: String,
    pub outcome: Outcome,
    pub reason: Option<DenyReason>,
    /// Subject of a privileged action (e.g. the principal whose roles changed).
    pub target: Option<String>,
    pub details: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub request_id: RequestId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSortField {
    #[default]
    Timestamp,
    Action,
    ActorId,
    Outcome,
}

impl AuditSortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timestamp" => Some(Self::Timestamp),
            "action" => Some(Self::Action),
            "actor_id" | "user_id" => Some(Self::ActorId),
            "outcome" => Some(Self::Outcome),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Filter, sort and page selection for audit queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub actor_id: Option<PrincipalId>,
    pub action: Option<String>,
    /// Inclusive lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub end: Option<DateTime<Utc>>,
    pub sort_by: AuditSortField,
    pub direction: SortDirection,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

impl AuditQuery {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            actor_id: None,
            action: None,
            start: None,
            end: None,
            sort_by: AuditSortField::default(),
            direction: SortDirection::default(),
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.actor_id.is_none_or(|id| record.actor_id == Some(id))
            && self.action.as_deref().is_none_or(|a| record.action == a)
            && self.start.is_none_or(|start| record.timestamp >= start)
            && self.end.is_none_or(|end| record.timestamp <= end)
    }
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of audit records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    pub logs: Vec<AuditRecord>,
    pub total: u64,
    pub pages: u32,
    pub current_page: u32,
}

impl AuditPage {
    pub fn new(logs: Vec<AuditRecord>, total: u64, query: &AuditQuery) -> Self {
        let pages = total.div_ceil(u64::from(query.per_page));
        Self {
            logs,
            total,
            pages: u32::try_from(pages).unwrap_or(u32::MAX),
            current_page: query.page,
        }
    }
}

/// Audit persistence seam.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), StoreError>;
    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError>;
}

#[async_trait]
impl<S> AuditLog for Arc<S>
where
    S: AuditLog + ?Sized,
{
    async fn append(&self, record: AuditRecord) -> Result<(), StoreError> {
        (**self).append(record).await
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        (**self).query(query).await
    }
}

/// In-memory append-only audit log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record in insertion order.
    pub fn all(&self) -> Vec<AuditRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }
}

fn compare(a: &AuditRecord, b: &AuditRecord, field: AuditSortField) -> std::cmp::Ordering {
    let primary = match field {
        AuditSortField::Timestamp => a.timestamp.cmp(&b.timestamp),
        AuditSortField::Action => a.action.cmp(&b.action),
        AuditSortField::ActorId => a.actor_id.cmp(&b.actor_id),
        AuditSortField::Outcome => a.outcome.cmp(&b.outcome),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::poisoned("audit log"))?;
        records.push(record);
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::poisoned("audit log"))?;

        let mut matching: Vec<&AuditRecord> = records.iter().filter(|r| query.matches(r)).collect();
        matching.sort_by(|a, b| {
            let ord = compare(a, b, query.sort_by);
            match query.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });

        let total = matching.len() as u64;
        let logs = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.per_page as usize)
            .cloned()
            .collect();

        Ok(AuditPage::new(logs, total, query))
    }
}

/// Writes audit records and mirrors them as structured log events.
#[derive(Clone)]
pub struct AuditEmitter {
    log: Arc<dyn AuditLog>,
}

impl AuditEmitter {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self { log }
    }

    pub async fn emit(&self, record: AuditRecord) -> Result<(), StoreError> {
        match record.outcome {
            Outcome::Allow => tracing::info!(
                audit_id = %record.id,
                actor_id = ?record.actor_id,
                action = %record.action,
                endpoint = %record.endpoint,
                request_id = %record.request_id,
                ip = ?record.ip,
                "audit"
            ),
            Outcome::Deny => tracing::warn!(
                audit_id = %record.id,
                actor_id = ?record.actor_id,
                action = %record.action,
                endpoint = %record.endpoint,
                reason = ?record.reason.map(DenyReason::code),
                request_id = %record.request_id,
                ip = ?record.ip,
                "audit"
            ),
        }
        self.log.append(record).await
    }

    /// Record a privileged business action performed by an authorized principal.
    pub async fn record_action(
        &self,
        identity: &IdentityContext,
        action: &str,
        target: Option<String>,
        details: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        self.emit(AuditRecord {
            id: AuditRecordId::new(),
            actor_id: Some(identity.principal_id()),
            action: action.to_string(),
            endpoint: identity.endpoint.clone(),
            outcome: Outcome::Allow,
            reason: None,
            target,
            details,
            ip: identity.ip.clone(),
            request_id: identity.request_id,
            timestamp: Utc::now(),
        })
        .await
    }

    /// Record a refused business action (e.g. a failed MFA confirmation)
    /// that happened after the guard let the request through.
    pub async fn record_denial(
        &self,
        identity: &IdentityContext,
        action: &str,
        reason: DenyReason,
        details: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        self.emit(AuditRecord {
            id: AuditRecordId::new(),
            actor_id: Some(identity.principal_id()),
            action: action.to_string(),
            endpoint: identity.endpoint.clone(),
            outcome: Outcome::Deny,
            reason: Some(reason),
            target: None,
            details,
            ip: identity.ip.clone(),
            request_id: identity.request_id,
            timestamp: Utc::now(),
        })
        .await
    }

    pub async fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        self.log.query(query).await
    }
}
