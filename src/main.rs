use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sea_orm_migration::MigratorTrait;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dineline_api::{
    config::AppConfig,
    db,
    events::{broadcaster::{BroadcastHub, Broadcaster, RedisBroadcaster}, process_events, EventSender},
    gateway::HttpPaymentGateway,
    migrator::Migrator,
    router, AppState,
};

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config);

    info!(
        environment = %config.environment,
        "Starting dineline-api {}",
        env!("CARGO_PKG_VERSION")
    );

    let db = Arc::new(
        db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?,
    );

    if config.auto_migrate {
        info!("Running database migrations");
        Migrator::up(&*db, None)
            .await
            .context("failed to run migrations")?;
    }

    let (tx, rx) = mpsc::channel(1024);
    let event_sender = EventSender::new(tx);
    tokio::spawn(process_events(rx));

    let broadcaster: Arc<dyn Broadcaster> = match config.broadcaster.as_str() {
        "redis" => {
            let client = redis::Client::open(config.redis_url.as_str())
                .context("failed to open redis client")?;
            Arc::new(RedisBroadcaster::new(Arc::new(client)))
        }
        _ => Arc::new(BroadcastHub::default()),
    };

    let gateway = Arc::new(HttpPaymentGateway::new(&config.gateway));

    let addr = SocketAddr::new(
        config.host.parse().context("invalid host address")?,
        config.port,
    );

    let state = AppState::new(config, db, gateway, broadcaster, event_sender);
    let app = router(state);

    info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app)
        .await
        .context("server terminated")?;

    Ok(())
}
