// src/error.rs
use std::fmt;

use sqlx::error::{DatabaseError, ErrorKind};
use sqlx::postgres::PgDatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique violation: {0}")]
    UniqueViolation(Violation),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(Violation),
    #[error("check violation: {0}")]
    CheckViolation(Violation),
    #[error("not null violation: {0}")]
    NotNullViolation(Violation),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("role {0} already exists")]
    RoleExists(String),
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// The violated constraint details, for the four integrity error kinds.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            StoreError::UniqueViolation(v)
            | StoreError::ForeignKeyViolation(v)
            | StoreError::CheckViolation(v)
            | StoreError::NotNullViolation(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_constraint(&self, constraint: Constraint) -> bool {
        self.violation()
            .and_then(Violation::constraint)
            .is_some_and(|c| c == constraint)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let kind = ViolationKind::from_error_kind(db.kind())
                .or_else(|| db.code().as_deref().and_then(ViolationKind::from_sqlstate));
            if let Some(kind) = kind {
                return kind.into_error(Violation::from_database_error(&**db));
            }
        }
        StoreError::Database(err)
    }
}

/// Integrity error classes, from the driver's error kind or the SQLSTATE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    Unique,
    ForeignKey,
    Check,
    NotNull,
}

impl ViolationKind {
    pub fn from_error_kind(kind: ErrorKind) -> Option<Self> {
        match kind {
            ErrorKind::UniqueViolation => Some(ViolationKind::Unique),
            ErrorKind::ForeignKeyViolation => Some(ViolationKind::ForeignKey),
            ErrorKind::CheckViolation => Some(ViolationKind::Check),
            ErrorKind::NotNullViolation => Some(ViolationKind::NotNull),
            _ => None,
        }
    }

    pub fn from_sqlstate(code: &str) -> Option<Self> {
        match code {
            "23505" => Some(ViolationKind::Unique),
            "23503" => Some(ViolationKind::ForeignKey),
            "23514" => Some(ViolationKind::Check),
            "23502" => Some(ViolationKind::NotNull),
            _ => None,
        }
    }

    pub fn into_error(self, violation: Violation) -> StoreError {
        match self {
            ViolationKind::Unique => StoreError::UniqueViolation(violation),
            ViolationKind::ForeignKey => StoreError::ForeignKeyViolation(violation),
            ViolationKind::Check => StoreError::CheckViolation(violation),
            ViolationKind::NotNull => StoreError::NotNullViolation(violation),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Violation {
    pub constraint_name: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub message: String,
}

impl Violation {
    fn from_database_error(db: &dyn DatabaseError) -> Self {
        let pg = db.try_downcast_ref::<PgDatabaseError>();
        Violation {
            constraint_name: db.constraint().map(str::to_owned),
            table: pg.and_then(|e| e.table()).map(str::to_owned),
            column: pg.and_then(|e| e.column()).map(str::to_owned),
            message: db.message().to_owned(),
        }
    }

    /// The schema constraint this violation names, when it is one of ours.
    pub fn constraint(&self) -> Option<Constraint> {
        self.constraint_name.as_deref().and_then(Constraint::from_name)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.constraint_name, &self.table, &self.column) {
            (Some(name), _, _) => write!(f, "{name} ({})", self.message),
            (None, Some(table), Some(column)) => write!(f, "{table}.{column} ({})", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Named constraints declared by the migrations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Constraint {
    UsersAuth0Id,
    UsersEmail,
    UsersStripeCustomerId,
    VisitorNotesVisitorVideo,
    UserNotesUserVideo,
    UserNotesUser,
    UserReportsUser,
    NoteGenerationUserVideo,
    NoteGenerationUser,
    SharedUserReport,
    SharedVisitorReport,
    SharedUserReportUnique,
    SharedVisitorReportUnique,
    OneReportType,
}

impl Constraint {
    pub const ALL: [Constraint; 14] = [
        Constraint::UsersAuth0Id,
        Constraint::UsersEmail,
        Constraint::UsersStripeCustomerId,
        Constraint::VisitorNotesVisitorVideo,
        Constraint::UserNotesUserVideo,
        Constraint::UserNotesUser,
        Constraint::UserReportsUser,
        Constraint::NoteGenerationUserVideo,
        Constraint::NoteGenerationUser,
        Constraint::SharedUserReport,
        Constraint::SharedVisitorReport,
        Constraint::SharedUserReportUnique,
        Constraint::SharedVisitorReportUnique,
        Constraint::OneReportType,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Constraint::UsersAuth0Id => "users_auth0_id_key",
            Constraint::UsersEmail => "users_email_key",
            Constraint::UsersStripeCustomerId => "users_stripe_customer_id_key",
            Constraint::VisitorNotesVisitorVideo => "visitor_notes_pkey",
            Constraint::UserNotesUserVideo => "user_notes_user_id_youtube_video_url_key",
            Constraint::UserNotesUser => "user_notes_user_id_fkey",
            Constraint::UserReportsUser => "user_reports_user_id_fkey",
            Constraint::NoteGenerationUserVideo => {
                "note_generation_history_user_id_youtube_video_id_key"
            }
            Constraint::NoteGenerationUser => "note_generation_history_user_id_fkey",
            Constraint::SharedUserReport => "public_shared_reports_user_report_id_fkey",
            Constraint::SharedVisitorReport => "public_shared_reports_visitor_report_id_fkey",
            Constraint::SharedUserReportUnique => "public_shared_reports_user_report_id_key",
            Constraint::SharedVisitorReportUnique => "public_shared_reports_visitor_report_id_key",
            Constraint::OneReportType => "one_report_type",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Constraint::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classes_map_to_distinct_kinds() {
        assert_eq!(ViolationKind::from_sqlstate("23505"), Some(ViolationKind::Unique));
        assert_eq!(ViolationKind::from_sqlstate("23503"), Some(ViolationKind::ForeignKey));
        assert_eq!(ViolationKind::from_sqlstate("23514"), Some(ViolationKind::Check));
        assert_eq!(ViolationKind::from_sqlstate("23502"), Some(ViolationKind::NotNull));
        assert_eq!(ViolationKind::from_sqlstate("42P01"), None);
        assert_eq!(ViolationKind::from_sqlstate("40001"), None);
    }

    #[test]
    fn driver_error_kinds_map_like_sqlstates() {
        assert_eq!(
            ViolationKind::from_error_kind(ErrorKind::UniqueViolation),
            ViolationKind::from_sqlstate("23505")
        );
        assert_eq!(
            ViolationKind::from_error_kind(ErrorKind::ForeignKeyViolation),
            Some(ViolationKind::ForeignKey)
        );
        assert_eq!(
            ViolationKind::from_error_kind(ErrorKind::CheckViolation),
            Some(ViolationKind::Check)
        );
        assert_eq!(
            ViolationKind::from_error_kind(ErrorKind::NotNullViolation),
            Some(ViolationKind::NotNull)
        );
        assert_eq!(ViolationKind::from_error_kind(ErrorKind::Other), None);
    }

    #[test]
    fn constraint_names_round_trip() {
        for c in Constraint::ALL {
            assert_eq!(Constraint::from_name(c.name()), Some(c));
        }
        assert_eq!(Constraint::from_name("users_pkey"), None);
    }

    #[test]
    fn store_error_exposes_constraint() {
        let err = ViolationKind::Check.into_error(Violation {
            constraint_name: Some("one_report_type".into()),
            message: "new row violates check constraint".into(),
            ..Default::default()
        });
        assert!(matches!(err, StoreError::CheckViolation(_)));
        assert!(err.is_constraint(Constraint::OneReportType));
        assert!(!err.is_constraint(Constraint::UserNotesUserVideo));
        assert_eq!(
            err.to_string(),
            "check violation: one_report_type (new row violates check constraint)"
        );
    }

    #[test]
    fn not_null_violation_displays_column() {
        let v = Violation {
            table: Some("users".into()),
            column: Some("email".into()),
            message: "null value".into(),
            ..Default::default()
        };
        assert_eq!(v.to_string(), "users.email (null value)");
        assert_eq!(v.constraint(), None);
    }

    #[test]
    fn non_database_errors_stay_opaque() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
        assert!(err.violation().is_none());
    }
}
