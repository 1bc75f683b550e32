//! Web server module.

mod handlers;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::loader::QueryLoader;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub loader: QueryLoader,
}

/// Web server for querylift.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>, loader: QueryLoader) -> Self {
        Self {
            state: AppState {
                config,
                store,
                loader,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // Stored queries
            .route(
                "/api/queries",
                get(handlers::handle_get_queries).post(handlers::handle_create_query),
            )
            .route("/api/queries/upgrade", post(handlers::handle_upgrade_all))
            .route(
                "/api/queries/{id}",
                get(handlers::handle_get_query)
                    .put(handlers::handle_update_query)
                    .delete(handlers::handle_delete_query),
            )
            .route("/api/queries/{id}/upgrade", post(handlers::handle_upgrade_query))
            // Stateless migration
            .route("/api/migrate", post(handlers::handle_migrate))
            .route("/api/migrations", get(handlers::handle_list_migrations))
            // Time grains
            .route("/api/timegrains/iso8601", get(handlers::handle_timegrain_iso8601))
            .route("/api/timegrains/closest", get(handlers::handle_timegrain_closest))
            .route("/api/timegrains/auto", get(handlers::handle_timegrain_auto))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
