// src/db/reports.rs
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{contains_pattern, Page, Paged};
use crate::error::StoreError;
use crate::models::{
    PublicSharedReport, SharedReportTarget, SharedReportView, UserReport, VisitorReport,
};

pub async fn create_user_report(
    pool: &PgPool,
    user_id: Uuid,
    search_query: &str,
    title: Option<&str>,
) -> Result<UserReport, StoreError> {
    let report = sqlx::query_as::<_, UserReport>(
        "INSERT INTO user_reports (user_id, search_query, title) VALUES ($1, $2, $3) \
         RETURNING id, user_id, search_query, title, created_at",
    )
    .bind(user_id)
    .bind(search_query)
    .bind(title)
    .fetch_one(pool)
    .await?;
    Ok(report)
}

pub async fn create_visitor_report(
    pool: &PgPool,
    visitor_id: &str,
    search_query: &str,
    title: Option<&str>,
) -> Result<VisitorReport, StoreError> {
    let report = sqlx::query_as::<_, VisitorReport>(
        "INSERT INTO visitor_reports (visitor_id, search_query, title) VALUES ($1, $2, $3) \
         RETURNING id, visitor_id, search_query, title, created_at",
    )
    .bind(visitor_id)
    .bind(search_query)
    .bind(title)
    .fetch_one(pool)
    .await?;
    Ok(report)
}

/// Newest first. `search` matches title or query, case-insensitively.
pub async fn list_user_reports(
    pool: &PgPool,
    user_id: Uuid,
    search: Option<&str>,
    page: Page,
) -> Result<Paged<UserReport>, StoreError> {
    let pattern = search.map(contains_pattern);
    let clause = if pattern.is_some() {
        " AND (LOWER(title) LIKE LOWER($2) OR LOWER(search_query) LIKE LOWER($2))"
    } else {
        ""
    };

    let count_sql = format!("SELECT COUNT(*) FROM user_reports WHERE user_id = $1{clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(user_id);
    if let Some(pattern) = &pattern {
        count_query = count_query.bind(pattern);
    }
    let total = count_query.fetch_one(pool).await?;

    let (limit, offset) = if pattern.is_some() { ("$3", "$4") } else { ("$2", "$3") };
    let list_sql = format!(
        "SELECT id, user_id, search_query, title, created_at FROM user_reports \
         WHERE user_id = $1{clause} ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}"
    );
    let mut list_query = sqlx::query_as::<_, UserReport>(&list_sql).bind(user_id);
    if let Some(pattern) = &pattern {
        list_query = list_query.bind(pattern);
    }
    let reports = list_query
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok(Paged::new(reports, total, page))
}

pub async fn count_user_reports(pool: &PgPool, user_id: Uuid) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_reports WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Reports created at or after `since`, e.g. the start of the billing month.
pub async fn count_user_reports_since(
    pool: &PgPool,
    user_id: Uuid,
    since: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_reports WHERE user_id = $1 AND created_at >= $2",
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// The report, if it belongs to the account identified by `auth0_id`.
pub async fn find_owned_user_report(
    pool: &PgPool,
    report_id: Uuid,
    auth0_id: &str,
) -> Result<Option<UserReport>, StoreError> {
    let report = sqlx::query_as::<_, UserReport>(
        "SELECT r.id, r.user_id, r.search_query, r.title, r.created_at \
         FROM user_reports r JOIN users u ON r.user_id = u.id \
         WHERE r.id = $1 AND u.auth0_id = $2",
    )
    .bind(report_id)
    .bind(auth0_id)
    .fetch_optional(pool)
    .await?;
    Ok(report)
}

/// Publishes a report. An existing share for the same report is returned
/// instead of creating a second one; the flag tells which happened.
/// A concurrent loser's insert does nothing and reads the winner's row back.
pub async fn share_report(
    pool: &PgPool,
    target: SharedReportTarget,
) -> Result<(PublicSharedReport, bool), StoreError> {
    let column = match target {
        SharedReportTarget::User(_) => "user_report_id",
        SharedReportTarget::Visitor(_) => "visitor_report_id",
    };
    let report_id = match target {
        SharedReportTarget::User(id) | SharedReportTarget::Visitor(id) => id,
    };

    let inserted = sqlx::query_as::<_, PublicSharedReport>(&format!(
        "INSERT INTO public_shared_reports (user_report_id, visitor_report_id) VALUES ($1, $2) \
         ON CONFLICT ({column}) WHERE {column} IS NOT NULL DO NOTHING \
         RETURNING id, user_report_id, visitor_report_id, created_at"
    ))
    .bind(target.user_report_id())
    .bind(target.visitor_report_id())
    .fetch_optional(pool)
    .await?;

    if let Some(share) = inserted {
        tracing::info!("Shared report {} as {}", report_id, share.id);
        return Ok((share, true));
    }

    let existing = sqlx::query_as::<_, PublicSharedReport>(&format!(
        "SELECT id, user_report_id, visitor_report_id, created_at \
         FROM public_shared_reports WHERE {column} = $1"
    ))
    .bind(report_id)
    .fetch_optional(pool)
    .await?;

    // The conflicting share can only vanish if its report was deleted meanwhile.
    let share = existing.ok_or(StoreError::NotFound("report"))?;
    Ok((share, false))
}

pub async fn find_shared_report(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<Option<PublicSharedReport>, StoreError> {
    let share = sqlx::query_as::<_, PublicSharedReport>(
        "SELECT id, user_report_id, visitor_report_id, created_at \
         FROM public_shared_reports WHERE id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?;
    Ok(share)
}

/// Looks up a public share together with the report behind it.
pub async fn resolve_shared_report(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<Option<SharedReportView>, StoreError> {
    let row = sqlx::query(
        "SELECT s.id, s.user_report_id, s.visitor_report_id, s.created_at, \
                COALESCE(ur.title, vr.title) AS title, \
                COALESCE(ur.search_query, vr.search_query) AS search_query \
         FROM public_shared_reports s \
         LEFT JOIN user_reports ur ON ur.id = s.user_report_id \
         LEFT JOIN visitor_reports vr ON vr.id = s.visitor_report_id \
         WHERE s.id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let share = PublicSharedReport {
        id: row.try_get("id")?,
        user_report_id: row.try_get("user_report_id")?,
        visitor_report_id: row.try_get("visitor_report_id")?,
        created_at: row.try_get("created_at")?,
    };
    let target = share.target().ok_or(StoreError::NotFound("shared report target"))?;
    let search_query: Option<String> = row.try_get("search_query")?;

    Ok(Some(SharedReportView {
        public_id: share.id,
        target,
        title: row.try_get("title")?,
        search_query: search_query.ok_or(StoreError::NotFound("shared report target"))?,
        shared_at: share.created_at,
    }))
}
