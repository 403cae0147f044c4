use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod config;
mod db;
mod error;
mod extract;
mod form;
mod mapping;
mod normalize;
mod render;
mod service;
mod vision;

use crate::config::StaticConfig;
use crate::db::Database;
use crate::service::FormsmithService;

// Re-export config crate types to avoid namespace collision
use ::config::{Config as ConfigBuilder, Environment, File};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting Formsmith service v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration (server binding, storage, model backends)
    let static_config: StaticConfig = ConfigBuilder::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("FORMSMITH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    let static_config = Arc::new(static_config);

    info!(
        host = %static_config.server.host,
        port = static_config.server.port,
        "Configuration loaded"
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&static_config.storage.data_dir)?;

    // Initialize database
    let db_path = static_config.storage.data_dir.join("formsmith.db");
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    // Initialize the service
    let service = Arc::new(FormsmithService::new(db, static_config.clone()).await?);

    // Build the router
    let app = api::router(service.clone(), &static_config);

    // Start the analysis worker (resumes any jobs left behind by a
    // previous run)
    FormsmithService::start_analysis_worker(service.clone());

    // Start the server
    let addr = format!(
        "{}:{}",
        static_config.server.host, static_config.server.port
    );
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("formsmith_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
