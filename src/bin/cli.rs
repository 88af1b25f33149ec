use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use portier::access::{AccessDecision, Hooks, Portier, Visitor};
use portier::config::PortierConfig;
use portier::models::settings::{NetworkSettingsUpdate, SiteSettingsUpdate};
use portier::models::{SiteId, UserId};
use portier::store::{ConfigStore, SqliteStore};
use portier::utils::hash_password;

#[derive(Parser, Debug)]
#[command(author, version, about = "portier administration tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Create a local user
    CreateUser {
        login: String,
        password: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        super_admin: bool,
        #[arg(long)]
        primary_site: Option<SiteId>,
    },
    /// Turn protection of a single site on or off
    ProtectSite {
        site_id: SiteId,
        /// Disable protection instead of enabling it
        #[arg(long)]
        off: bool,
        /// Replace the allow-list (comma separated user ids)
        #[arg(long, value_delimiter = ',')]
        allow: Option<Vec<UserId>>,
        #[arg(long)]
        message: Option<String>,
    },
    /// Change network-wide protection
    ProtectNetwork {
        #[arg(long)]
        off: bool,
        #[arg(long)]
        network_only: Option<bool>,
        #[arg(long)]
        redirect: Option<bool>,
        #[arg(long)]
        hide_my_sites: Option<bool>,
        #[arg(long)]
        exempt_main_site: Option<bool>,
        #[arg(long, value_delimiter = ',')]
        allow: Option<Vec<UserId>>,
        #[arg(long)]
        message: Option<String>,
    },
    /// Print the access decision for a user on a site (0 = anonymous)
    Check { user_id: UserId, site_id: SiteId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::CreateUser {
            login,
            password,
            display_name,
            super_admin,
            primary_site,
        } => {
            let pool = get_pool().await?;
            let password_hash = hash_password(&password)?;
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO users (login, display_name, password_hash, is_super_admin, primary_site_id) \
                 VALUES (?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(&login)
            .bind(display_name.as_deref().unwrap_or(&login))
            .bind(password_hash)
            .bind(super_admin)
            .bind(primary_site)
            .fetch_one(&pool)
            .await
            .with_context(|| format!("failed to create user `{login}`"))?;
            println!("Created user {login} with id {id}");
        }
        Commands::ProtectSite {
            site_id,
            off,
            allow,
            message,
        } => {
            let store = SqliteStore::new(get_pool().await?);
            let changes = SiteSettingsUpdate {
                protect: Some(!off),
                allowed_users: allow,
                login_message: message,
            }
            .into_map()?;
            store.save_site_settings(site_id, &changes).await?;
            println!("Site {site_id} protection {}", if off { "disabled" } else { "enabled" });
        }
        Commands::ProtectNetwork {
            off,
            network_only,
            redirect,
            hide_my_sites,
            exempt_main_site,
            allow,
            message,
        } => {
            let store = SqliteStore::new(get_pool().await?);
            let changes = NetworkSettingsUpdate {
                protect: Some(!off),
                network_only,
                redirect,
                hide_my_sites,
                exempt_main_site,
                allowed_users: allow,
                login_message: message,
            }
            .into_map()?;
            store.save_network_settings(&changes).await?;
            println!("Network protection {}", if off { "disabled" } else { "enabled" });
        }
        Commands::Check { user_id, site_id } => {
            let store = Arc::new(SqliteStore::new(get_pool().await?));
            let portier = Portier::new(PortierConfig::from_env()?, store.clone(), store, Hooks::new());
            match portier.engine().evaluate(&Visitor::new(user_id), site_id).await {
                AccessDecision::Allowed => println!("user {user_id} on site {site_id}: allowed"),
                AccessDecision::Blocked(scope) => {
                    println!("user {user_id} on site {site_id}: blocked by {scope} protection")
                }
            }
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let filename = format!("{}_{}.sql", timestamp, sanitize_name(name));
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied_versions: HashSet<i64> = if has_table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {display}"))
}
