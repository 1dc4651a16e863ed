use google_sso::{MemoryUserStore, UserStore};
use google_sso_server::{
    app,
    auth::{AppState, db::PgUserStore},
    config::ServerConfig,
    error::ServerError,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> google_sso_core::Result<(), ServerError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().map_err(|err| ServerError::Config {
        details: err.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let users: Arc<dyn UserStore> = match &config.database_url {
        Some(database_url) => {
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .map_err(|err| ServerError::Database {
                    details: err.to_string(),
                })?;

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .map_err(|err| ServerError::Database {
                    details: err.to_string(),
                })?;

            Arc::new(PgUserStore::new(db_pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, users are kept in memory");
            Arc::new(MemoryUserStore::new())
        }
    };

    let state = AppState::new(&config, users).map_err(|report| ServerError::Sso {
        details: report.current_context().to_string(),
    })?;
    let state = Arc::new(state);

    // Spawn periodic session cleanup task
    let cleanup_state = Arc::clone(&state);
    let cleanup_interval_secs = config.session.cleanup_interval_seconds;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(cleanup_interval_secs));
        loop {
            interval.tick().await;
            let count = cleanup_state.sessions.delete_expired();
            if count > 0 {
                tracing::debug!(deleted_sessions = count, "Periodic session cleanup");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|err| ServerError::Serve {
            details: format!("{}: {}", config.listen_addr, err),
        })?;

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app::router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ServerError::Serve {
            details: err.to_string(),
        })?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutting down");
}
