// src/db/feedback.rs
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Feedback, FeedbackAuthor, FeedbackCheck, NewFeedback};

pub async fn insert_feedback(pool: &PgPool, feedback: &NewFeedback) -> Result<Uuid, StoreError> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO user_feedback \
         (auth0_id, visitor_id, youtube_video_id, youtube_video_title, feedback_text, was_helpful, is_tldr) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
    )
    .bind(feedback.author.auth0_id())
    .bind(feedback.author.visitor_id())
    .bind(&feedback.youtube_video_id)
    .bind(feedback.youtube_video_title.as_deref())
    .bind(feedback.feedback_text.as_deref().filter(|t| !t.is_empty()))
    .bind(feedback.was_helpful)
    .bind(feedback.is_tldr)
    .fetch_one(pool)
    .await?;
    tracing::info!("Feedback saved for video {} - ID: {}", feedback.youtube_video_id, id);
    Ok(id)
}

pub async fn find_feedback(pool: &PgPool, id: Uuid) -> Result<Option<Feedback>, StoreError> {
    let feedback = sqlx::query_as::<_, Feedback>(
        "SELECT id, auth0_id, visitor_id, youtube_video_id, youtube_video_title, feedback_text, \
         was_helpful, is_tldr, created_at FROM user_feedback WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(feedback)
}

/// Whether `author` already left feedback for the video. Anonymous feedback
/// cannot be traced back, so it always reports none.
pub async fn check_feedback(
    pool: &PgPool,
    author: &FeedbackAuthor,
    youtube_video_id: &str,
    is_tldr: bool,
) -> Result<FeedbackCheck, StoreError> {
    let (column, identity) = match author {
        FeedbackAuthor::User(id) => ("auth0_id", id.as_str()),
        FeedbackAuthor::Visitor(id) => ("visitor_id", id.as_str()),
        FeedbackAuthor::Anonymous => {
            return Ok(FeedbackCheck {
                has_feedback: false,
                was_helpful: None,
            });
        }
    };

    let row: Option<(Option<bool>,)> = sqlx::query_as(&format!(
        "SELECT was_helpful FROM user_feedback \
         WHERE {column} = $1 AND youtube_video_id = $2 AND is_tldr = $3 \
         ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(identity)
    .bind(youtube_video_id)
    .bind(is_tldr)
    .fetch_optional(pool)
    .await?;

    Ok(FeedbackCheck {
        has_feedback: row.is_some(),
        was_helpful: row.and_then(|(helpful,)| helpful),
    })
}
