// src/db/mod.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::StoreError;

pub mod feedback;
pub mod notes;
pub mod reports;
pub mod users;
pub mod webhooks;

/// The ordered schema history, embedded at build time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(config: &Config) -> Result<PgPool, StoreError> {
    let options = config.connect_options()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect_with(options)
        .await?;
    tracing::info!("Connected to Postgres");
    Ok(pool)
}

/// Applies every pending migration. Already-applied versions are skipped, so
/// this is safe to run on every deploy.
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    MIGRATOR.run(pool).await?;
    tracing::info!("Database migrations applied successfully");
    Ok(())
}

#[derive(Clone, Debug, Serialize)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: String,
    pub installed_on: Option<DateTime<Utc>>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.installed_on.is_some()
    }
}

pub async fn migration_status(pool: &PgPool) -> Result<Vec<MigrationStatus>, StoreError> {
    let has_ledger: bool =
        sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
            .fetch_one(pool)
            .await?;

    let applied: Vec<(i64, DateTime<Utc>)> = if has_ledger {
        sqlx::query_as("SELECT version, installed_on FROM _sqlx_migrations WHERE success")
            .fetch_all(pool)
            .await?
    } else {
        Vec::new()
    };

    Ok(MIGRATOR
        .iter()
        .map(|m| MigrationStatus {
            version: m.version,
            description: m.description.to_string(),
            installed_on: applied
                .iter()
                .find(|(version, _)| *version == m.version)
                .map(|(_, at)| *at),
        })
        .collect())
}

/// 1-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    page: u32,
    per_page: u32,
}

impl Page {
    pub const DEFAULT_PER_PAGE: u32 = 10;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: u32, per_page: u32) -> Self {
        Page {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new(1, Self::DEFAULT_PER_PAGE)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: i64,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        let per_page = i64::from(page.per_page.max(1));
        Paged {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}

/// `%needle%` with LIKE metacharacters escaped (default `\` escape).
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamps_and_offsets() {
        let page = Page::new(0, 0);
        assert_eq!(page, Page { page: 1, per_page: 1 });
        assert_eq!(page.offset(), 0);

        let page = Page::new(3, 500);
        assert_eq!(page.per_page(), Page::MAX_PER_PAGE);
        assert_eq!(page.offset(), 200);

        assert_eq!(Page::default().limit(), 10);
    }

    #[test]
    fn zero_page_does_not_panic() {
        let page = Page { page: 0, per_page: 0 };
        assert_eq!(page.offset(), 0);
        let paged: Paged<i32> = Paged::new(Vec::new(), 5, page);
        assert_eq!(paged.total_pages, 5);
    }

    #[test]
    fn total_pages_rounds_up() {
        let paged = Paged::new(vec![1, 2, 3], 21, Page::default());
        assert_eq!(paged.total_pages, 3);
        let empty: Paged<i32> = Paged::new(Vec::new(), 0, Page::default());
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("dQw4w9WgXcQ"), "%dQw4w9WgXcQ%");
        assert_eq!(contains_pattern("a_b%c\\"), "%a\\_b\\%c\\\\%");
    }

    #[test]
    fn migration_versions_strictly_increase() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert!(!versions.is_empty());
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn migrations_never_add_bare_not_null_columns() {
        for migration in MIGRATOR.iter() {
            for line in migration.sql.lines() {
                let upper = line.to_ascii_uppercase();
                if upper.contains("ADD COLUMN") && upper.contains("NOT NULL") {
                    assert!(
                        upper.contains("DEFAULT"),
                        "migration {} adds a NOT NULL column without a default: {line}",
                        migration.version
                    );
                }
            }
        }
    }

    #[test]
    fn schema_declares_every_named_constraint() {
        let sql: String = MIGRATOR.iter().map(|m| m.sql.to_string()).collect();
        for constraint in crate::error::Constraint::ALL {
            assert!(
                sql.contains(constraint.name()),
                "constraint {constraint} is not declared by any migration"
            );
        }
        assert!(sql.contains("CONSTRAINT one_report_type CHECK"));
    }

    #[test]
    fn owned_tables_cascade_from_users() {
        let sql: String = MIGRATOR.iter().map(|m| m.sql.to_string()).collect();
        assert_eq!(sql.matches("REFERENCES users (id) ON DELETE CASCADE").count(), 3);
    }
}
