//! Andar Bahar game server.
//!
//! Spawns the single round orchestrator actor over Postgres-backed ledger
//! and history stores, then serves the WebSocket/HTTP API.

use ab_server::{api, config, metrics};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use log::info;
use pico_args::Arguments;

use andar_bahar::db::Database;
use andar_bahar::history::PgHistoryStore;
use andar_bahar::ledger::PgLedgerStore;
use andar_bahar::table::RoundActor;

const HELP: &str = "\
Run an Andar Bahar game server

USAGE:
  ab_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:4000]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:4000)
  METRICS_BIND             Prometheus exporter bind address (optional)
  DATABASE_URL             PostgreSQL connection string
  TABLE_NAME               Table name for logs
  LOBBY_SECONDS            Betting window length          [default: 30]
  DRAW_INTERVAL_MS         Milliseconds between draws     [default: 1200]
  SETTLE_SECONDS           Results delay before next round [default: 5]
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let database_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;

    env_logger::builder().format_target(false).init();

    let config = config::ServerConfig::from_env(bind_override, database_url_override)?;
    config.validate()?;

    info!("Starting Andar Bahar server at {}", config.bind);

    // Initialize database
    info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    db.init_schema()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize schema: {}", e))?;
    info!("Database connected");

    let pool = Arc::new(db.pool().clone());
    let ledger = Arc::new(PgLedgerStore::new(pool.clone()));
    let history = Arc::new(PgHistoryStore::new(pool));

    // Spawn the round orchestrator
    let (actor, handle) = RoundActor::new(config.table.clone(), ledger.clone(), history.clone());
    tokio::spawn(actor.run());
    info!(
        "Table '{}' running: lobby {}s, draw every {}ms, settle {}s",
        config.table.name,
        config.table.lobby_seconds,
        config.table.draw_interval_ms,
        config.table.settle_seconds
    );

    // Metrics exporter, if configured
    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(Error::msg)?;
        info!("Prometheus metrics at http://{metrics_bind}/metrics");
    }

    let state = api::AppState {
        table: handle,
        ledger,
        history,
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
