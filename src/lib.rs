pub mod api;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{ConfigErrors, FieldViolation, GalaxyError, Result};

pub use logic::{
    spawn_reaper, ClearReport, GalaxyEngine, GenerationTicket, JobObserver, JobReaper,
    LoggingObserver,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{InMemoryStore, PostgresStore, Store};

use crate::config::{AppConfig, StorageBackend};

/// Build an engine over `store`, start the reaper and serve the API until shutdown.
pub async fn serve_with<S: Store + 'static>(store: S, config: &AppConfig) -> anyhow::Result<()> {
    use axum::serve;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    let engine = GalaxyEngine::new(Arc::new(store), config.generation.clone());
    let _reaper = spawn_reaper(engine.clone());

    let app = api::routes::create_router().with_state(Arc::new(engine));

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Galaxy server listening on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}

// Function for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = AppConfig::load()?;

    match config.database.backend {
        StorageBackend::Postgres => {
            let database_url = config.database_url()?;
            let store = PostgresStore::new(
                &database_url,
                config.database.max_connections.unwrap_or(20),
            )
            .await?;
            store.migrate().await?;
            serve_with(store, &config).await
        }
        StorageBackend::Memory => serve_with(InMemoryStore::new(), &config).await,
    }
}
