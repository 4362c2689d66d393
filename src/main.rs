//! Exchange broker daemon.
//!
//! Serves the REST API and runs the timeout sweeper until Ctrl+C or
//! SIGTERM. Storage is PostgreSQL when a `database` section is configured,
//! in-memory otherwise.

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use exchange_broker::adapters::http;
use exchange_broker::adapters::postgres::{
    self, PostgresAuditLog, PostgresContactRepository, PostgresConversationRepository,
    PostgresExchangeRepository, PostgresProfileRepository,
};
use exchange_broker::adapters::{InMemoryEventBus, TracingAlertSink};
use exchange_broker::application::{BrokerPorts, ExchangeBroker};
use exchange_broker::config::{AppConfig, ConfigError, DatabaseConfig, ValidationError};
use exchange_broker::domain::foundation::DomainError;

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] DomainError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    let ports = match &config.database {
        Some(database) => postgres_ports(database).await?,
        None => {
            warn!("No database configured, using in-memory storage");
            BrokerPorts::in_memory()
        }
    };
    let broker = Arc::new(ExchangeBroker::new(ports, &config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = broker.sweeper();
    let sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let app = http::app(broker)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, environment = ?config.server.environment, "Exchange broker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Exchange broker shutting down");
    if shutdown_tx.send(true).is_err() {
        warn!("Timeout sweeper already stopped");
    }
    if let Err(err) = sweeper_task.await {
        error!(error = %err, "Timeout sweeper task failed");
    }

    Ok(())
}

/// JSON lines in production or when asked for, readable text otherwise.
/// `RUST_LOG` wins over the configured level.
fn init_tracing(config: &AppConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() || config.server.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn postgres_ports(database: &DatabaseConfig) -> Result<BrokerPorts, StartupError> {
    let pool = database.pool_options().connect(&database.url).await?;
    info!(max_connections = database.max_connections, "Connected to PostgreSQL");

    if database.run_migrations {
        postgres::run_migrations(&pool).await?;
        info!("Database migrations applied");
    }

    Ok(BrokerPorts {
        contacts: Arc::new(PostgresContactRepository::new(pool.clone())),
        exchanges: Arc::new(PostgresExchangeRepository::new(pool.clone())),
        conversations: Arc::new(PostgresConversationRepository::new(pool.clone())),
        profiles: Arc::new(PostgresProfileRepository::new(pool.clone())),
        audit: Arc::new(PostgresAuditLog::new(pool)),
        alerts: Arc::new(TracingAlertSink::new()),
        events: Arc::new(InMemoryEventBus::new()),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received terminate signal, initiating graceful shutdown"),
    }
}
