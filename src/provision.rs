// src/provision.rs
//! Least-privilege application role.
//!
//! Grants are declarative and safe to re-run. The `ALTER DEFAULT PRIVILEGES`
//! statements cover objects later created by the role that runs this step,
//! so provisioning should run as the same role that applies migrations.

use std::str::FromStr;

use sqlx::PgPool;

use crate::error::StoreError;

const MAX_IDENTIFIER_LEN: usize = 63;

/// What to do when the application role already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OnExistingRole {
    /// Keep the role and re-apply grants.
    #[default]
    Reuse,
    /// Refuse with `StoreError::RoleExists`.
    Fail,
}

impl FromStr for OnExistingRole {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reuse" => Ok(OnExistingRole::Reuse),
            "fail" => Ok(OnExistingRole::Fail),
            other => Err(StoreError::Config(format!(
                "APP_ROLE_ON_EXISTING must be `reuse` or `fail`, got `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RoleSpec {
    pub name: String,
    pub password: Option<String>,
    pub schema: String,
    pub on_existing: OnExistingRole,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    Reused,
}

/// Accepts plain unquoted-style identifiers only.
pub fn validate_identifier(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if valid_start && valid_rest && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// CREATE ROLE statement. Kept separate from the grants so it can be skipped
/// for an existing role.
pub fn create_role_statement(spec: &RoleSpec) -> Result<String, StoreError> {
    let role = quote_identifier(validate_identifier(&spec.name)?);
    Ok(match &spec.password {
        Some(password) => format!("CREATE ROLE {role} LOGIN PASSWORD {}", quote_literal(password)),
        None => format!("CREATE ROLE {role} LOGIN"),
    })
}

/// Renders the grant script for `spec` on `database`.
pub fn grant_statements(spec: &RoleSpec, database: &str) -> Result<Vec<String>, StoreError> {
    let role = quote_identifier(validate_identifier(&spec.name)?);
    let schema = quote_identifier(validate_identifier(&spec.schema)?);
    let database = quote_identifier(database);

    Ok(vec![
        format!("GRANT CONNECT ON DATABASE {database} TO {role}"),
        format!("GRANT USAGE ON SCHEMA {schema} TO {role}"),
        format!("GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA {schema} TO {role}"),
        format!("GRANT USAGE, SELECT ON ALL SEQUENCES IN SCHEMA {schema} TO {role}"),
        format!(
            "ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO {role}"
        ),
        format!(
            "ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} GRANT USAGE, SELECT ON SEQUENCES TO {role}"
        ),
    ])
}

pub async fn role_exists(pool: &PgPool, name: &str) -> Result<bool, StoreError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_roles WHERE rolname = $1)")
            .bind(name)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

pub async fn current_database(pool: &PgPool) -> Result<String, StoreError> {
    let name: String = sqlx::query_scalar("SELECT current_database()")
        .fetch_one(pool)
        .await?;
    Ok(name)
}

/// Creates the application role if needed and (re-)applies its grants in a
/// single transaction.
pub async fn provision_app_role(
    pool: &PgPool,
    spec: &RoleSpec,
) -> Result<ProvisionOutcome, StoreError> {
    validate_identifier(&spec.name)?;
    validate_identifier(&spec.schema)?;

    let database = current_database(pool).await?;
    let mut tx = pool.begin().await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_roles WHERE rolname = $1)")
            .bind(&spec.name)
            .fetch_one(&mut *tx)
            .await?;

    let outcome = match (exists, spec.on_existing) {
        (true, OnExistingRole::Fail) => {
            tracing::error!("Role {} already exists", spec.name);
            return Err(StoreError::RoleExists(spec.name.clone()));
        }
        (true, OnExistingRole::Reuse) => {
            tracing::info!("Role {} already exists, refreshing grants", spec.name);
            ProvisionOutcome::Reused
        }
        (false, _) => {
            sqlx::query(&create_role_statement(spec)?)
                .execute(&mut *tx)
                .await?;
            tracing::info!("Created role {}", spec.name);
            ProvisionOutcome::Created
        }
    };

    for statement in grant_statements(spec, &database)? {
        tracing::debug!("{}", statement);
        sqlx::query(&statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    tracing::info!(
        "Granted {} DML privileges on schema {} in database {}",
        spec.name,
        spec.schema,
        database
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> RoleSpec {
        RoleSpec {
            name: name.to_string(),
            password: None,
            schema: "public".to_string(),
            on_existing: OnExistingRole::Reuse,
        }
    }

    #[test]
    fn identifiers_must_be_plain() {
        assert!(validate_identifier("swiftnotes_app").is_ok());
        assert!(validate_identifier("_svc$1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1app").is_err());
        assert!(validate_identifier("app; DROP TABLE users").is_err());
        assert!(validate_identifier("app\"").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn literals_escape_quotes() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_identifier("odd\"db"), "\"odd\"\"db\"");
    }

    #[test]
    fn create_role_includes_quoted_password() {
        let mut s = spec("swiftnotes_app");
        assert_eq!(
            create_role_statement(&s).unwrap(),
            "CREATE ROLE \"swiftnotes_app\" LOGIN"
        );
        s.password = Some("o'reilly".to_string());
        assert_eq!(
            create_role_statement(&s).unwrap(),
            "CREATE ROLE \"swiftnotes_app\" LOGIN PASSWORD 'o''reilly'"
        );
    }

    #[test]
    fn grants_cover_current_and_future_objects() {
        let statements = grant_statements(&spec("swiftnotes_app"), "swiftnotes").unwrap();
        assert_eq!(statements.len(), 6);
        assert_eq!(
            statements[0],
            "GRANT CONNECT ON DATABASE \"swiftnotes\" TO \"swiftnotes_app\""
        );
        assert!(statements.iter().any(|s| s.contains("ON ALL TABLES IN SCHEMA \"public\"")));
        let defaults: Vec<_> = statements
            .iter()
            .filter(|s| s.starts_with("ALTER DEFAULT PRIVILEGES"))
            .collect();
        assert_eq!(defaults.len(), 2);
        assert!(defaults[0].ends_with("ON TABLES TO \"swiftnotes_app\""));
        assert!(defaults[1].ends_with("ON SEQUENCES TO \"swiftnotes_app\""));
    }

    #[test]
    fn grants_reject_bad_schema() {
        let mut s = spec("swiftnotes_app");
        s.schema = "public, pg_catalog".to_string();
        assert!(matches!(
            grant_statements(&s, "swiftnotes"),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn on_existing_parses_case_insensitively() {
        assert_eq!("Reuse".parse::<OnExistingRole>().unwrap(), OnExistingRole::Reuse);
        assert_eq!("FAIL".parse::<OnExistingRole>().unwrap(), OnExistingRole::Fail);
        assert!("skip".parse::<OnExistingRole>().is_err());
    }
}
