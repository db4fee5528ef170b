use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mq::{AmqpConfig, Broker, EventPublisher, Topology, init_mq};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use server::config::AppConfig;
use server::database::{init_db, run_migrations};
use server::health::HealthService;
use server::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "herald", version, about = "Request API publishing lifecycle events to RabbitMQ")]
struct Cli {
    /// Check the database, the broker and the migration directory, print the
    /// result and exit (0 when healthy).
    #[arg(long)]
    health_check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    if cli.health_check {
        let report = HealthService::from_config(&config).run().await;
        print!("{}", report.render());
        return Ok(if report.is_healthy() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    serve(config).await?;
    Ok(ExitCode::SUCCESS)
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let db = init_db(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    run_migrations(&config.database.url, &config.database.migration_path)
        .await
        .context("Failed to apply database migrations")?;

    let broker: Arc<dyn Broker> = Arc::new(
        init_mq(AmqpConfig {
            url: config.mq.url.clone(),
            connection_name: config.mq.connection_name.clone(),
        })
        .await
        .context("Failed to connect to RabbitMQ")?,
    );
    info!("Connected to RabbitMQ");

    let topology = Topology::from_config(&config.mq.topology);
    topology
        .provision(broker.as_ref())
        .await
        .context("Failed to provision broker topology")?;

    let publisher = EventPublisher::new(broker.clone(), topology.primary_exchange());
    let health = Arc::new(HealthService::from_config(&config));
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState {
        config: Arc::new(config),
        db: db.clone(),
        publisher,
        health,
    };
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped, closing connections");
    if let Err(e) = broker.close().await {
        warn!(error = %e, "Failed to close RabbitMQ connection");
    }
    if let Err(e) = db.close().await {
        warn!(error = %e, "Failed to close database pool");
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
