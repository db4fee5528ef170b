//! Dependency checks shared by `GET /health` and `herald --health-check`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::config::AppConfig;

/// Upper bound for a single check.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A single dependency probe. `Err` carries a human-readable reason.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &'static str;
    async fn check(&self) -> Result<(), String>;
}

/// Opens a fresh connection, pings it and runs `SELECT 1`.
pub struct DatabaseCheck {
    url: String,
}

impl DatabaseCheck {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl HealthCheck for DatabaseCheck {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn check(&self) -> Result<(), String> {
        let mut opt = ConnectOptions::new(self.url.clone());
        opt.max_connections(1)
            .connect_timeout(CHECK_TIMEOUT)
            .sqlx_logging(false);

        let db = Database::connect(opt)
            .await
            .map_err(|e| format!("failed to connect: {e}"))?;

        let result = probe(&db).await;
        let _ = db.close().await;
        result
    }
}

async fn probe(db: &DatabaseConnection) -> Result<(), String> {
    db.ping().await.map_err(|e| format!("ping failed: {e}"))?;

    let row = db
        .query_one_raw(Statement::from_string(DbBackend::Postgres, "SELECT 1 AS one"))
        .await
        .map_err(|e| format!("query failed: {e}"))?
        .ok_or_else(|| "query returned no rows".to_string())?;
    let one: i32 = row
        .try_get("", "one")
        .map_err(|e| format!("unexpected result: {e}"))?;

    if one != 1 {
        return Err(format!("unexpected result: {one}"));
    }
    Ok(())
}

/// Connects to the broker and opens a channel.
pub struct BrokerCheck {
    url: String,
}

impl BrokerCheck {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl HealthCheck for BrokerCheck {
    fn name(&self) -> &'static str {
        "rabbitmq"
    }

    async fn check(&self) -> Result<(), String> {
        mq::amqp::ping(&self.url).await.map_err(|e| e.to_string())
    }
}

/// The migration directory must exist.
pub struct MigrationsCheck {
    path: PathBuf,
}

impl MigrationsCheck {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl HealthCheck for MigrationsCheck {
    fn name(&self) -> &'static str {
        "migrations"
    }

    async fn check(&self) -> Result<(), String> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(format!("{} is not a directory", self.path.display())),
            Err(e) => Err(format!("{}: {e}", self.path.display())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    /// Check name to `OK` or `ERROR: <reason>`.
    #[schema(example = json!({"database": "OK", "rabbitmq": "OK", "migrations": "OK"}))]
    pub checks: BTreeMap<String, String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Plain-text rendering for the command line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Health check: {:?}", self.status);
        for (name, result) in &self.checks {
            let _ = writeln!(out, "  {name}: {result}");
        }
        out
    }
}

pub struct HealthService {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthService {
    pub fn new(checks: Vec<Arc<dyn HealthCheck>>) -> Self {
        Self { checks }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(vec![
            Arc::new(DatabaseCheck::new(&config.database.url)),
            Arc::new(BrokerCheck::new(&config.mq.url)),
            Arc::new(MigrationsCheck::new(&config.database.migration_path)),
        ])
    }

    /// Run every check; a check exceeding [`CHECK_TIMEOUT`] fails.
    pub async fn run(&self) -> HealthReport {
        let mut checks = BTreeMap::new();
        let mut healthy = true;

        for check in &self.checks {
            let outcome = match tokio::time::timeout(CHECK_TIMEOUT, check.check()).await {
                Ok(result) => result,
                Err(_) => Err(format!("timed out after {}s", CHECK_TIMEOUT.as_secs())),
            };
            let line = match outcome {
                Ok(()) => "OK".to_string(),
                Err(reason) => {
                    warn!(check = check.name(), %reason, "Health check failed");
                    healthy = false;
                    format!("ERROR: {reason}")
                }
            };
            checks.insert(check.name().to_string(), line);
        }

        HealthReport {
            status: if healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            timestamp: Utc::now(),
            checks,
        }
    }
}
