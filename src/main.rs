// src/main.rs
use anyhow::{Context, bail};
use swiftnotes_db::config::Config;
use swiftnotes_db::{db, provision};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const USAGE: &str = "usage: swiftnotes-db [migrate|status|provision|grants]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    dotenv::dotenv().ok();
    let config = Config::from_env().context("Failed to load config from environment")?;

    let command = std::env::args().nth(1).unwrap_or_else(|| "migrate".to_string());
    tracing::info!("Running swiftnotes-db {}", command);

    match command.as_str() {
        "migrate" => {
            let pool = db::connect(&config).await?;
            db::apply_schema(&pool).await?;
        }
        "status" => {
            let pool = db::connect(&config).await?;
            for migration in db::migration_status(&pool).await? {
                let state = match migration.installed_on {
                    Some(at) => format!("applied {}", at.to_rfc3339()),
                    None => "pending".to_string(),
                };
                println!("{} {:<32} {}", migration.version, migration.description, state);
            }
        }
        "provision" => {
            let spec = config
                .role_spec()?
                .context("APP_ROLE_NAME must be set to provision a role")?;
            let pool = db::connect(&config).await?;
            let outcome = provision::provision_app_role(&pool, &spec).await?;
            tracing::info!("Provisioned role {} ({:?})", spec.name, outcome);
        }
        "grants" => {
            let spec = config
                .role_spec()?
                .context("APP_ROLE_NAME must be set to render grants")?;
            let pool = db::connect(&config).await?;
            let database = provision::current_database(&pool).await?;
            if !provision::role_exists(&pool, &spec.name).await? {
                let redacted = provision::RoleSpec {
                    password: spec.password.as_ref().map(|_| "********".to_string()),
                    ..spec.clone()
                };
                println!("{};", provision::create_role_statement(&redacted)?);
            }
            for statement in provision::grant_statements(&spec, &database)? {
                println!("{statement};");
            }
        }
        other => bail!("unknown command `{other}`\n{USAGE}"),
    }

    Ok(())
}
