use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use heartbeat_api::config::get_config;
use heartbeat_api::errors::{HeartbeatError, HeartbeatResult};
use heartbeat_api::server::{
    build_router, AppState, BotStore, Database, ProxyRotatingPool, RandomJitter, RemoteValidator,
    SystemClock,
};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("heartbeat server stopped: {e}");
        eprintln!("heartbeat server stopped: {e}");
        std::process::exit(1);
    }
}

async fn run() -> HeartbeatResult<()> {
    let config = get_config()?;

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = Database::connect(&config.database).await?;
    info!(backend = db.backend_name(), "Database connected");

    let pool = ProxyRotatingPool::new(&config.validator)?;
    info!(clients = pool.len(), "Outbound request pool ready");

    let validator = RemoteValidator::new(
        Arc::new(pool),
        Arc::new(RandomJitter),
        &config.validator,
        &config.heartbeat,
    );

    let state = AppState::new(db, Arc::new(validator), Arc::new(SystemClock), config);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| HeartbeatError::ConfigError(format!("invalid bind address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| HeartbeatError::ServerError(format!("failed to bind {addr}: {e}")))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| HeartbeatError::ServerError(format!("server error: {e}")))
}
