// src/db/users.rs
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{SubscriptionStatus, User};

const USER_COLUMNS: &str = "id, auth0_id, email, stripe_customer_id, subscription_id, \
     subscription_status, subscription_cancelled_at, subscription_cancelled_period_ends_at, \
     created_at, updated_at";

pub async fn find_by_auth0_id(pool: &PgPool, auth0_id: &str) -> Result<Option<User>, StoreError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE auth0_id = $1"
    ))
    .bind(auth0_id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, StoreError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Strict insert; a taken `auth0_id` or `email` surfaces as `UniqueViolation`.
pub async fn insert_user(pool: &PgPool, auth0_id: &str, email: &str) -> Result<User, StoreError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (auth0_id, email, subscription_status) VALUES ($1, $2, $3) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(auth0_id)
    .bind(email)
    .bind(SubscriptionStatus::Inactive.as_str())
    .fetch_one(pool)
    .await?;
    Ok(user)
}

/// Returns the account for `auth0_id`, creating it on first authentication.
///
/// A concurrent first login for the same identity loses the insert race and
/// reads the winner's row. An email already owned by another identity is
/// still a `UniqueViolation`.
pub async fn get_or_create(pool: &PgPool, auth0_id: &str, email: &str) -> Result<User, StoreError> {
    if let Some(user) = find_by_auth0_id(pool, auth0_id).await? {
        return Ok(user);
    }

    let created = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (auth0_id, email, subscription_status) VALUES ($1, $2, $3) \
         ON CONFLICT ON CONSTRAINT users_auth0_id_key DO NOTHING \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(auth0_id)
    .bind(email)
    .bind(SubscriptionStatus::Inactive.as_str())
    .fetch_optional(pool)
    .await?;

    match created {
        Some(user) => {
            tracing::info!("Created new user with auth0_id: {}", auth0_id);
            Ok(user)
        }
        None => find_by_auth0_id(pool, auth0_id)
            .await?
            .ok_or(StoreError::NotFound("user")),
    }
}

/// Marks the account owning `email` as subscribed. Returns rows affected.
pub async fn activate_subscription(
    pool: &PgPool,
    email: &str,
    subscription_id: &str,
    stripe_customer_id: &str,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        "UPDATE users SET subscription_status = $1, subscription_id = $2, \
         stripe_customer_id = $3, updated_at = now() WHERE email = $4",
    )
    .bind(SubscriptionStatus::Active.as_str())
    .bind(subscription_id)
    .bind(stripe_customer_id)
    .bind(email)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Undoes a pending cancellation. Only rows with a cancellation recorded are
/// touched, so the return value tells whether anything was renewed.
pub async fn renew_subscription(pool: &PgPool, stripe_customer_id: &str) -> Result<u64, StoreError> {
    let result = sqlx::query(
        "UPDATE users SET subscription_status = $1, subscription_cancelled_at = NULL, \
         subscription_cancelled_period_ends_at = NULL, updated_at = now() \
         WHERE stripe_customer_id = $2 AND subscription_cancelled_at IS NOT NULL",
    )
    .bind(SubscriptionStatus::Active.as_str())
    .bind(stripe_customer_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Records a cancel-at-period-end request reported by the payment provider.
/// The status stays as it is until the subscription is reported deleted.
pub async fn schedule_cancellation(
    pool: &PgPool,
    stripe_customer_id: &str,
    period_ends_at: DateTime<Utc>,
) -> Result<u64, StoreError> {
    mark_cancellation(pool, "stripe_customer_id", stripe_customer_id, period_ends_at).await
}

/// Same as [`schedule_cancellation`], for a cancel requested by the signed-in user.
pub async fn schedule_cancellation_for_auth0_id(
    pool: &PgPool,
    auth0_id: &str,
    period_ends_at: DateTime<Utc>,
) -> Result<u64, StoreError> {
    mark_cancellation(pool, "auth0_id", auth0_id, period_ends_at).await
}

async fn mark_cancellation(
    pool: &PgPool,
    key_column: &'static str,
    key: &str,
    period_ends_at: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let result = sqlx::query(&format!(
        "UPDATE users SET subscription_cancelled_at = now(), \
         subscription_cancelled_period_ends_at = $1, updated_at = now() \
         WHERE {key_column} = $2"
    ))
    .bind(period_ends_at)
    .bind(key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn set_subscription_status(
    pool: &PgPool,
    stripe_customer_id: &str,
    status: &SubscriptionStatus,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        "UPDATE users SET subscription_status = $1, updated_at = now() \
         WHERE stripe_customer_id = $2",
    )
    .bind(status.as_str())
    .bind(stripe_customer_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Removes the account; notes, reports, generation history and their shares
/// go with it.
pub async fn delete_user(pool: &PgPool, id: Uuid) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
