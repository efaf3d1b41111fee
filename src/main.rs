use galaxy_forge::config::{AppConfig, StorageBackend};
use galaxy_forge::serve_with;
use galaxy_forge::store::{InMemoryStore, PostgresStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .init();

    println!("Galaxy Forge: procedural galaxy generator");

    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{} backend={:?}",
        config.server.host, config.server.port, config.database.backend
    );

    match config.database.backend {
        StorageBackend::Postgres => {
            println!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store = PostgresStore::new(
                &database_url,
                config.database.max_connections.unwrap_or(20),
            )
            .await?;

            println!("Running database migrations...");
            store.migrate().await?;
            println!("Database ready");

            serve_with(store, &config).await?;
        }
        StorageBackend::Memory => {
            println!("Using in-memory storage; galaxies are lost on restart");
            serve_with(InMemoryStore::new(), &config).await?;
        }
    }

    Ok(())
}
