//! querylift - stored panel query migration service
//!
//! Keeps Azure Monitor panel queries in SQLite and upgrades every historical
//! query shape to the current schema on load.

mod config;
mod db;
mod loader;
mod migrate;
mod web;

use config::ServerConfig;
use db::Store;
use loader::QueryLoader;
use migrate::{MigrationEngine, QueryDefaults};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("querylift=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting querylift on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let defaults = QueryDefaults::default().with_workspace(cfg.default_workspace.clone());
    let engine = MigrationEngine::new().with_defaults(defaults);
    tracing::info!("Migration pipeline: {} steps", engine.steps().len());
    let loader = QueryLoader::new(store.clone(), engine);

    if cfg.upgrade_on_start {
        loader.upgrade_all()?;
    }

    // Start web server
    let server = Server::new(cfg, store, loader);
    server.start().await?;

    Ok(())
}
