//! Campus loans server
//!
//! REST API server for device reservations, loans and waitlists.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use campus_loans_server::{
    api,
    config::{AppConfig, EventsBackend, LockBackend, StorageBackend},
    repository::Repository,
    services::{
        devices::HttpDeviceCatalogue,
        events::{EventGridPublisher, EventPublisher, LogEventPublisher},
        locks::{LocalReservationLock, RedisReservationLock, ReservationLock},
        loans::LoansService,
        Collaborators, Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    init_tracing(&config);

    tracing::info!("Starting campus loans server v{}", env!("CARGO_PKG_VERSION"));

    let repository = match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await?;
            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Database migrations completed");

            Repository::postgres(pool)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Repository::in_memory()
        }
    };

    let locks: Arc<dyn ReservationLock> = match config.locks.backend {
        LockBackend::Redis => {
            let locks = RedisReservationLock::new(&config.redis.url, &config.locks).await?;
            tracing::info!("Connected to Redis for device locks");
            Arc::new(locks)
        }
        LockBackend::Local => Arc::new(LocalReservationLock::new(Duration::from_millis(
            config.locks.acquire_timeout_ms,
        ))),
    };

    let events: Arc<dyn EventPublisher> = match config.events.backend {
        EventsBackend::EventGrid => Arc::new(EventGridPublisher::new(&config.events)?),
        EventsBackend::Log => Arc::new(LogEventPublisher::new()),
    };

    let collaborators = Collaborators {
        devices: Arc::new(HttpDeviceCatalogue::new(&config.devices)?),
        events,
        locks,
    };

    let services = Services::new(repository, collaborators);

    if config.loans.overdue_sweep_interval_secs > 0 {
        spawn_overdue_sweep(
            services.loans.clone(),
            Duration::from_secs(config.loans.overdue_sweep_interval_secs),
        );
    }

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("campus_loans_server={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Persist overdue flips in the background
fn spawn_overdue_sweep(loans: LoansService, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = loans.sweep_overdue().await {
                tracing::error!(error = %e, "Overdue sweep failed");
            }
        }
    });
}
