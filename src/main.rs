use anyhow::Context;
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use seat_reservation::{
    app,
    config::Config,
    database::Database,
    redis_client::RedisClient,
    repository::PgReservationRepository,
    services::ExpirationSweeper,
    AppState,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.app.rust_log).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.app.log_format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config);

    info!("Starting seat reservation service");

    // Connect to the database
    let db = Database::new(&config.database.url, config.database.pool_size)
        .await
        .context("failed to connect to database")?;
    db.run_migrations()
        .await
        .context("failed to run migrations")?;
    info!("Database connected");

    let repo = Arc::new(PgReservationRepository::new(db));
    let settings = config.reservation.settings();

    // Redis is optional: without it we run with no seat locks and no cache
    let state = if config.redis.url.is_empty() {
        warn!("Redis disabled, running without seat locks and availability cache");
        AppState::new(repo, settings)
    } else {
        match RedisClient::new(&config.redis.url).await {
            Ok(redis) => {
                info!("Redis connected");
                AppState::with_kv(repo, Arc::new(redis), settings, config.reservation.cache_ttl())
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, running without seat locks and availability cache");
                AppState::new(repo, settings)
            }
        }
    };
    let state = Arc::new(state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = config.sweeper.enabled.then(|| {
        ExpirationSweeper::new(
            state.reservations.clone(),
            config.sweeper.interval(),
            config.sweeper.expire_after(),
        )
        .start(shutdown_rx.clone())
    });

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("server error")?;

    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }

    info!("Shutdown complete");
    Ok(())
}
