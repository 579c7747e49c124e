// src/models.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct User {
    pub id: Uuid,
    pub auth0_id: String,
    pub email: String,
    pub stripe_customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub subscription_status: String,
    pub subscription_cancelled_at: Option<DateTime<Utc>>,
    pub subscription_cancelled_period_ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from(self.subscription_status.as_str())
    }
}

/// Values written to `users.subscription_status`.
///
/// The column is plain text; anything the payment handler writes beyond the
/// two known values decodes as `Other`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Other(String),
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Inactive => "INACTIVE",
            SubscriptionStatus::Other(s) => s,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

impl From<&str> for SubscriptionStatus {
    fn from(s: &str) -> Self {
        match s {
            "ACTIVE" => SubscriptionStatus::Active,
            "INACTIVE" => SubscriptionStatus::Inactive,
            other => SubscriptionStatus::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct UserNote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub youtube_video_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct VisitorNote {
    pub visitor_id: String,
    pub youtube_video_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct NoteGeneration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub youtube_video_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct UserReport {
    pub id: Uuid,
    pub user_id: Uuid,
    pub search_query: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct VisitorReport {
    pub id: Uuid,
    pub visitor_id: String,
    pub search_query: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct PublicSharedReport {
    pub id: Uuid,
    pub user_report_id: Option<Uuid>,
    pub visitor_report_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl PublicSharedReport {
    /// The wrapped report. `None` only if the row was written around the
    /// `one_report_type` check, which the database prevents.
    pub fn target(&self) -> Option<SharedReportTarget> {
        match (self.user_report_id, self.visitor_report_id) {
            (Some(id), None) => Some(SharedReportTarget::User(id)),
            (None, Some(id)) => Some(SharedReportTarget::Visitor(id)),
            _ => None,
        }
    }
}

/// The single report a share points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SharedReportTarget {
    User(Uuid),
    Visitor(Uuid),
}

impl SharedReportTarget {
    pub fn user_report_id(self) -> Option<Uuid> {
        match self {
            SharedReportTarget::User(id) => Some(id),
            SharedReportTarget::Visitor(_) => None,
        }
    }

    pub fn visitor_report_id(self) -> Option<Uuid> {
        match self {
            SharedReportTarget::Visitor(id) => Some(id),
            SharedReportTarget::User(_) => None,
        }
    }
}

/// A public share joined with the report it publishes.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SharedReportView {
    pub public_id: Uuid,
    pub target: SharedReportTarget,
    pub title: Option<String>,
    pub search_query: String,
    pub shared_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub auth0_id: Option<String>,
    pub visitor_id: Option<String>,
    pub youtube_video_id: String,
    pub youtube_video_title: Option<String>,
    pub feedback_text: Option<String>,
    pub was_helpful: Option<bool>,
    pub is_tldr: bool,
    pub created_at: DateTime<Utc>,
}

/// Who left a piece of feedback. A signed-in author never carries a visitor id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedbackAuthor {
    User(String),
    Visitor(String),
    Anonymous,
}

impl FeedbackAuthor {
    pub fn auth0_id(&self) -> Option<&str> {
        match self {
            FeedbackAuthor::User(id) => Some(id),
            _ => None,
        }
    }

    pub fn visitor_id(&self) -> Option<&str> {
        match self {
            FeedbackAuthor::Visitor(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewFeedback {
    pub author: FeedbackAuthor,
    pub youtube_video_id: String,
    pub youtube_video_title: Option<String>,
    pub feedback_text: Option<String>,
    pub was_helpful: Option<bool>,
    pub is_tldr: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeedbackCheck {
    pub has_feedback: bool,
    pub was_helpful: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct WebhookLog {
    pub id: Uuid,
    pub stripe_event_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub event_type: String,
    pub event_data: Option<serde_json::Value>,
    pub processing_status: Option<String>,
    pub processing_details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct NewWebhookEvent {
    pub stripe_event_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub event_type: String,
    pub event_data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_status_keeps_unknown_values() {
        assert!(SubscriptionStatus::from("ACTIVE").is_active());
        assert_eq!(SubscriptionStatus::from("INACTIVE"), SubscriptionStatus::Inactive);
        let past_due = SubscriptionStatus::from("PAST_DUE");
        assert_eq!(past_due.as_str(), "PAST_DUE");
        assert!(!past_due.is_active());
    }

    #[test]
    fn shared_report_target_splits_into_columns() {
        let id = Uuid::new_v4();
        let user = SharedReportTarget::User(id);
        assert_eq!(user.user_report_id(), Some(id));
        assert_eq!(user.visitor_report_id(), None);

        let share = PublicSharedReport {
            id: Uuid::new_v4(),
            user_report_id: None,
            visitor_report_id: Some(id),
            created_at: Utc::now(),
        };
        assert_eq!(share.target(), Some(SharedReportTarget::Visitor(id)));
    }

    #[test]
    fn shared_report_target_serializes_tagged() {
        let id = Uuid::nil();
        let json = serde_json::to_value(SharedReportTarget::Visitor(id)).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "visitor", "id": id }));
    }

    #[test]
    fn feedback_author_fills_one_identity() {
        let user = FeedbackAuthor::User("auth0|1".into());
        assert_eq!(user.auth0_id(), Some("auth0|1"));
        assert_eq!(user.visitor_id(), None);
        assert_eq!(FeedbackAuthor::Anonymous.auth0_id(), None);
        assert_eq!(FeedbackAuthor::Anonymous.visitor_id(), None);
    }
}
