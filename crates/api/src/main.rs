//! Helpline API server

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use helpline_api::{
    clock::SystemClock,
    config::StorageBackend,
    create_router,
    store::PgStore,
    AppState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let config = Config::from_env().context("Invalid configuration")?;
    let bind_address = config.bind_address.clone();

    let state = match config.storage.clone() {
        StorageBackend::Memory => {
            tracing::warn!("DATABASE_URL=memory: call requests and chat history will not survive a restart");
            AppState::in_memory(config)
        }
        StorageBackend::Postgres {
            url,
            max_connections,
        } => {
            let pool = helpline_shared::create_pool(&url, max_connections)
                .await
                .context("Failed to connect to database")?;
            if config.run_migrations {
                helpline_shared::run_migrations(&pool)
                    .await
                    .context("Failed to run migrations")?;
                tracing::info!("Database migrations applied");
            }
            let store = PgStore::new(pool);
            AppState::new(
                config,
                Arc::new(store.clone()),
                Arc::new(store),
                Arc::new(SystemClock),
            )
        }
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "Helpline API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

/// `RUST_LOG` filtering, JSON output when `LOG_FORMAT=json`
fn setup_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("helpline_api=info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to setup signal handler: {}", e);
    }
    tracing::info!("Shutting down gracefully...");
}
