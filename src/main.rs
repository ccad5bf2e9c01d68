use std::sync::Arc;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use entregas::EntregasError;
use entregas::config::Config;
use entregas::db::Database;
use entregas::router::{EntregasState, entregas_router};
use entregas::service::DeliveryService;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    match run().await {
        Ok(()) => {}
        Err(EntregasError::Config(e)) => {
            // Logging is configured from this config, so it is not up yet.
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
        Err(EntregasError::Startup(e)) => {
            error!(error = %e, "database unreachable");
            error!("check that the server is running and accepts TCP connections");
            error!("check host, port, user and password in DB_* or ENTREGAS_DATABASE__*");
            error!("check that the configured database exists");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "entregas stopped");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<(), EntregasError> {
    let cfg = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        engine = %cfg.database.engine,
        host = %cfg.database.host,
        port = cfg.database.port_or_default(),
        database = %cfg.database.name,
        loglevel = %cfg.loglevel,
    );
    if cfg.api_key.is_empty() {
        warn!("api_key is empty; delivery routes will reject every request");
    }

    let db = Database::connect(&cfg.database);
    db.verify_connectivity().await?;

    if cfg.init_schema {
        db.init_schema().await?;
    }

    let state = EntregasState::new(DeliveryService::new(db), Arc::from(cfg.api_key.as_str()));
    let app = entregas_router(state);

    let addr = cfg.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
