//! Audit log browsing (admin only).

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::Query,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use storefront_auth::{AuditQuery, AuditSortField, PrincipalId, SortDirection};

use crate::app::{errors, services::AppServices};

/// Raw query string; every field is parsed by hand so bad input gets a JSON 400.
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogParams {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub user_id: Option<String>,
    pub action_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_number(name: &str, value: Option<String>) -> Result<Option<u32>, String> {
    non_empty(value)
        .map(|v| v.parse::<u32>().map_err(|_| format!("{name} must be a positive integer")))
        .transpose()
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` (start or end of that UTC day).
fn parse_date(name: &str, value: Option<String>, bound: Bound) -> Result<Option<DateTime<Utc>>, String> {
    let Some(raw) = non_empty(value) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| format!("{name} must be RFC 3339 or YYYY-MM-DD"))?;
    let time = match bound {
        Bound::Start => date.and_hms_opt(0, 0, 0),
        Bound::End => date.and_hms_milli_opt(23, 59, 59, 999),
    };
    time.map(|t| Some(t.and_utc()))
        .ok_or_else(|| format!("{name} is out of range"))
}

impl AuditLogParams {
    pub fn into_query(self) -> Result<AuditQuery, String> {
        let page = parse_number("page", self.page)?;
        if page == Some(0) {
            return Err("page must be at least 1".to_string());
        }
        let per_page = parse_number("per_page", self.per_page)?;
        let mut query = AuditQuery::new(page, per_page);

        query.actor_id = non_empty(self.user_id)
            .map(|v| v.parse::<PrincipalId>().map_err(|_| "user_id must be a UUID".to_string()))
            .transpose()?;
        query.action = non_empty(self.action_type);
        query.start = parse_date("start_date", self.start_date, Bound::Start)?;
        query.end = parse_date("end_date", self.end_date, Bound::End)?;
        if let (Some(start), Some(end)) = (query.start, query.end) {
            if start > end {
                return Err("start_date must not be after end_date".to_string());
            }
        }

        if let Some(raw) = non_empty(self.sort_by) {
            query.sort_by = AuditSortField::parse(&raw)
                .ok_or_else(|| "sort_by must be one of: timestamp, action, actor_id, outcome".to_string())?;
        }
        if let Some(raw) = non_empty(self.sort_direction) {
            query.direction =
                SortDirection::parse(&raw).ok_or_else(|| "sort_direction must be asc or desc".to_string())?;
        }
        Ok(query)
    }
}

/// GET /audit-logs
pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<AuditLogParams>,
) -> axum::response::Response {
    let query = match params.into_query() {
        Ok(q) => q,
        Err(msg) => return errors::bad_request("INVALID_QUERY", msg),
    };

    match services.audit.query(&query).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
