use clap::Parser;
use snip_core::Shortener;
use snip_gateway::cli::{LogFormat, StorageBackendArg, CLI};
use snip_gateway::{App, AppState};
use snip_identity::IdentityProvider;
use snip_shortener::ShortenerService;
use snip_storage::{FileStorage, InMemoryStorage, PostgresStorage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CLI::try_parse()?;
    init_tracing(config.log_format);

    info!(
        listen_addr = %config.listen_addr,
        base_url = %config.base_url,
        storage_backend = %config.storage,
        "starting gateway server"
    );

    let shortener: Arc<dyn Shortener> = match config.storage {
        StorageBackendArg::InMemory => Arc::new(ShortenerService::new(InMemoryStorage::new())),
        StorageBackendArg::File => {
            let path = config
                .file_storage_path
                .ok_or("file storage path is required when storage backend is file")?;
            info!(path = %path.display(), "using file storage");
            Arc::new(ShortenerService::new(FileStorage::new(path)))
        }
        StorageBackendArg::Postgres => {
            let dsn = config
                .database_dsn
                .ok_or("database dsn is required when storage backend is postgres")?;
            let storage = PostgresStorage::connect(&dsn).await?;
            storage.migrate().await?;
            Arc::new(ShortenerService::new(storage))
        }
    };

    let state = AppState::builder()
        .shortener(shortener)
        .identity(Arc::new(IdentityProvider::new(config.secret_key)))
        .base_url(config.base_url)
        .request_timeout(Duration::from_millis(config.request_timeout_ms))
        .build();

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(listen_addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => warn!(error = %err, "failed to listen for shutdown signal"),
    }
}
