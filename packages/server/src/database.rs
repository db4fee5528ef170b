use std::path::{Path, PathBuf};
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration directory '{}' does not exist", .0.display())]
    MissingDirectory(PathBuf),
    #[error("Failed to connect for migrations: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("Failed to apply migrations: {0}")]
    Migrate(#[from] MigrateError),
}

/// Open the connection pool and verify it answers.
pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let timeout = Duration::from_secs(config.connect_timeout_secs);
    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(timeout)
        .acquire_timeout(timeout)
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    db.ping().await?;

    Ok(db)
}

/// Apply every pending migration under `migration_path`.
///
/// Runs on a dedicated single-connection pool that is closed afterwards, so it
/// can be called before or without the application pool.
pub async fn run_migrations(database_url: &str, migration_path: &Path) -> Result<(), MigrationError> {
    if !migration_path.is_dir() {
        return Err(MigrationError::MissingDirectory(migration_path.to_path_buf()));
    }

    let migrator = Migrator::new(migration_path).await?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;

    let result = migrator.run(&pool).await;
    pool.close().await;
    result?;

    info!(
        path = %migration_path.display(),
        known = migrator.iter().count(),
        "Database migrations applied"
    );
    Ok(())
}
