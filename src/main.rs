//! Wikistore Backend
//!
//! A REST backend for versioned wiki documents with SQLite persistence:
//! append-only revision histories, attachment revision logs, rollback,
//! and conflict-aware copy/move.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Store;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Wikistore Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (WIKI_API_PSK). Writes are open to everyone!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let store = Arc::new(Store::new(pool));

    // Create application state
    let state = AppState {
        store,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let page = "/wikis/{wiki}/spaces/{space}/pages/{page}";
    let translation = "/wikis/{wiki}/spaces/{space}/pages/{page}/translations/{language}";
    let attachment = "/wikis/{wiki}/spaces/{space}/pages/{page}/attachments/{filename}";

    Router::new()
        // Pages
        .route(
            page,
            get(api::get_page)
                .put(api::put_page)
                .post(api::post_page)
                .delete(api::delete_page),
        )
        .route(&format!("{page}/history"), get(api::get_history))
        .route(&format!("{page}/children"), get(api::get_children))
        .route(&format!("{page}/rollback"), post(api::rollback_page))
        // Translations
        .route(&format!("{page}/translations"), get(api::get_translations))
        .route(
            translation,
            get(api::get_translation)
                .put(api::put_translation)
                .delete(api::delete_translation),
        )
        .route(
            &format!("{translation}/history"),
            get(api::get_translation_history),
        )
        // Attachments
        .route(&format!("{page}/attachments"), get(api::list_attachments))
        .route(
            attachment,
            get(api::get_attachment)
                .put(api::put_attachment)
                .delete(api::delete_attachment),
        )
        // Health check (no auth required)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
