// src/db/webhooks.rs
//! Payment webhook ledger. Rows are appended and later annotated with a
//! processing outcome; nothing here deletes them.
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{NewWebhookEvent, WebhookLog};

/// Event type recorded when a payload fails signature verification.
pub const VERIFICATION_FAILED: &str = "verification_failed";

const LOG_COLUMNS: &str = "id, stripe_event_id, stripe_customer_id, event_type, event_data, \
     processing_status, processing_details, created_at, processed_at";

/// Appends a received event. `processing_status` takes the column default.
pub async fn log_event(pool: &PgPool, event: &NewWebhookEvent) -> Result<Uuid, StoreError> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO webhook_logs (stripe_event_id, event_type, event_data, stripe_customer_id) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(event.stripe_event_id.as_deref())
    .bind(&event.event_type)
    .bind(&event.event_data)
    .bind(event.stripe_customer_id.as_deref())
    .fetch_one(pool)
    .await?;
    tracing::info!("Logged webhook event {} as {}", event.event_type, id);
    Ok(id)
}

pub async fn log_verification_failure(pool: &PgPool, details: &str) -> Result<Uuid, StoreError> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO webhook_logs (event_type, processing_status, processing_details, processed_at) \
         VALUES ($1, 'error', $2, now()) RETURNING id",
    )
    .bind(VERIFICATION_FAILED)
    .bind(format!("Verification error: {details}"))
    .fetch_one(pool)
    .await?;
    tracing::warn!("Webhook verification failed: {}", details);
    Ok(id)
}

/// Annotates a logged event with its outcome. The status vocabulary belongs
/// to the webhook handler and is stored verbatim.
pub async fn mark_processed(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    details: Option<&str>,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE webhook_logs SET processing_status = $1, processing_details = $2, \
         processed_at = now() WHERE id = $3",
    )
    .bind(status)
    .bind(details)
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("webhook log"));
    }
    Ok(())
}

pub async fn find_log(pool: &PgPool, id: Uuid) -> Result<Option<WebhookLog>, StoreError> {
    let log = sqlx::query_as::<_, WebhookLog>(&format!(
        "SELECT {LOG_COLUMNS} FROM webhook_logs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(log)
}

/// Earliest log row for a provider event id, for duplicate-delivery checks.
pub async fn find_by_event_id(
    pool: &PgPool,
    stripe_event_id: &str,
) -> Result<Option<WebhookLog>, StoreError> {
    let log = sqlx::query_as::<_, WebhookLog>(&format!(
        "SELECT {LOG_COLUMNS} FROM webhook_logs WHERE stripe_event_id = $1 \
         ORDER BY created_at LIMIT 1"
    ))
    .bind(stripe_event_id)
    .fetch_optional(pool)
    .await?;
    Ok(log)
}
