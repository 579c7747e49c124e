// src/db/notes.rs
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{contains_pattern, Page, Paged};
use crate::error::StoreError;
use crate::models::UserNote;

/// Narrows a note listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum NoteFilter {
    #[default]
    All,
    /// Notes whose URL contains this video id.
    VideoId(String),
    /// Case-insensitive substring match on the title.
    Title(String),
}

impl NoteFilter {
    fn clause(&self) -> &'static str {
        match self {
            NoteFilter::All => "",
            NoteFilter::VideoId(_) => " AND youtube_video_url LIKE $2",
            NoteFilter::Title(_) => " AND LOWER(title) LIKE LOWER($2)",
        }
    }

    fn pattern(&self) -> Option<String> {
        match self {
            NoteFilter::All => None,
            NoteFilter::VideoId(id) => Some(contains_pattern(id)),
            NoteFilter::Title(title) => Some(contains_pattern(title)),
        }
    }
}

/// Strict insert; the same `(user, url)` pair twice is a `UniqueViolation`
/// on `user_notes_user_id_youtube_video_url_key`.
pub async fn insert_user_note(
    pool: &PgPool,
    user_id: Uuid,
    title: Option<&str>,
    youtube_video_url: &str,
) -> Result<UserNote, StoreError> {
    let note = sqlx::query_as::<_, UserNote>(
        "INSERT INTO user_notes (user_id, title, youtube_video_url) VALUES ($1, $2, $3) \
         RETURNING id, user_id, title, youtube_video_url, created_at",
    )
    .bind(user_id)
    .bind(title)
    .bind(youtube_video_url)
    .fetch_one(pool)
    .await?;
    Ok(note)
}

/// Saves a note unless one already exists for the pair. Returns the creation
/// time only when a row was written.
pub async fn save_user_note(
    pool: &PgPool,
    user_id: Uuid,
    title: Option<&str>,
    youtube_video_url: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let created_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "INSERT INTO user_notes (user_id, title, youtube_video_url) VALUES ($1, $2, $3) \
         ON CONFLICT ON CONSTRAINT user_notes_user_id_youtube_video_url_key DO NOTHING \
         RETURNING created_at",
    )
    .bind(user_id)
    .bind(title)
    .bind(youtube_video_url)
    .fetch_optional(pool)
    .await?;
    if created_at.is_none() {
        tracing::debug!("Note for {} already saved by user {}", youtube_video_url, user_id);
    }
    Ok(created_at)
}

pub async fn is_note_saved(
    pool: &PgPool,
    user_id: Uuid,
    youtube_video_url: &str,
) -> Result<bool, StoreError> {
    let saved: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM user_notes WHERE user_id = $1 AND youtube_video_url = $2)",
    )
    .bind(user_id)
    .bind(youtube_video_url)
    .fetch_one(pool)
    .await?;
    Ok(saved)
}

/// Whether any saved note URL for the user mentions `video_id`, whatever the
/// URL shape (`watch?v=`, `youtu.be/`, ...).
pub async fn has_note_for_video(
    pool: &PgPool,
    user_id: Uuid,
    video_id: &str,
) -> Result<bool, StoreError> {
    let found: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM user_notes WHERE user_id = $1 AND youtube_video_url LIKE $2)",
    )
    .bind(user_id)
    .bind(contains_pattern(video_id))
    .fetch_one(pool)
    .await?;
    Ok(found)
}

pub async fn count_user_notes(pool: &PgPool, user_id: Uuid) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_notes WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Newest first.
pub async fn list_user_notes(
    pool: &PgPool,
    user_id: Uuid,
    filter: &NoteFilter,
    page: Page,
) -> Result<Paged<UserNote>, StoreError> {
    let clause = filter.clause();
    let pattern = filter.pattern();

    let count_sql = format!("SELECT COUNT(*) FROM user_notes WHERE user_id = $1{clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(user_id);
    if let Some(pattern) = &pattern {
        count_query = count_query.bind(pattern);
    }
    let total = count_query.fetch_one(pool).await?;

    let (limit, offset) = if pattern.is_some() { ("$3", "$4") } else { ("$2", "$3") };
    let list_sql = format!(
        "SELECT id, user_id, title, youtube_video_url, created_at FROM user_notes \
         WHERE user_id = $1{clause} ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}"
    );
    let mut list_query = sqlx::query_as::<_, UserNote>(&list_sql).bind(user_id);
    if let Some(pattern) = &pattern {
        list_query = list_query.bind(pattern);
    }
    let notes = list_query
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok(Paged::new(notes, total, page))
}

/// Deletes a note only if `user_id` owns it.
pub async fn delete_user_note(pool: &PgPool, user_id: Uuid, note_id: Uuid) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM user_notes WHERE user_id = $1 AND id = $2")
        .bind(user_id)
        .bind(note_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Records that an anonymous visitor generated notes for a video. Returns
/// `true` the first time for the pair.
pub async fn mark_visitor_note(
    pool: &PgPool,
    visitor_id: &str,
    youtube_video_id: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO visitor_notes (visitor_id, youtube_video_id) VALUES ($1, $2) \
         ON CONFLICT ON CONSTRAINT visitor_notes_pkey DO NOTHING",
    )
    .bind(visitor_id)
    .bind(youtube_video_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn has_visitor_note(
    pool: &PgPool,
    visitor_id: &str,
    youtube_video_id: &str,
) -> Result<bool, StoreError> {
    let found: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM visitor_notes WHERE visitor_id = $1 AND youtube_video_id = $2)",
    )
    .bind(visitor_id)
    .bind(youtube_video_id)
    .fetch_one(pool)
    .await?;
    Ok(found)
}

pub async fn count_visitor_notes(pool: &PgPool, visitor_id: &str) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visitor_notes WHERE visitor_id = $1")
        .bind(visitor_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Adds a generation event to the ledger. Returns `true` when this is the
/// first generation of the video for the user.
pub async fn record_generation(
    pool: &PgPool,
    user_id: Uuid,
    youtube_video_id: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO note_generation_history (user_id, youtube_video_id) VALUES ($1, $2) \
         ON CONFLICT ON CONSTRAINT note_generation_history_user_id_youtube_video_id_key DO NOTHING",
    )
    .bind(user_id)
    .bind(youtube_video_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn has_generated(
    pool: &PgPool,
    user_id: Uuid,
    youtube_video_id: &str,
) -> Result<bool, StoreError> {
    let found: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM note_generation_history \
         WHERE user_id = $1 AND youtube_video_id = $2)",
    )
    .bind(user_id)
    .bind(youtube_video_id)
    .fetch_one(pool)
    .await?;
    Ok(found)
}

pub async fn count_generations(pool: &PgPool, user_id: Uuid) -> Result<i64, StoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM note_generation_history WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_bind_escaped_patterns() {
        assert_eq!(NoteFilter::All.pattern(), None);
        assert_eq!(NoteFilter::All.clause(), "");
        assert_eq!(
            NoteFilter::VideoId("abc_123".into()).pattern().as_deref(),
            Some("%abc\\_123%")
        );
        assert!(NoteFilter::Title("Rust".into()).clause().contains("LOWER(title)"));
    }
}
