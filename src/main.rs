//! Impulse Academy site backend
//!
//! Serves the institute's public page and admin view over a live-synced document store.

mod api;
mod auth;
mod backend;
mod config;
mod db;
mod errors;
mod models;
mod site;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::LocalAuth;
use config::Config;
use db::SqliteStore;
use site::gate::SessionRegistry;
use site::{SiteApp, SiteSettings};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub site: Arc<SiteApp>,
    pub sessions: Arc<SessionRegistry>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Impulse Academy site backend");
    tracing::info!("Deployment id: {}", config.deployment_id);
    tracing::info!("Database path: {:?}", config.store.database_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("UI session idle TTL: {:?}", config.session_idle_ttl);

    if config.admin_passcode == config::DEFAULT_ADMIN_PASSCODE {
        tracing::warn!("Admin passcode is the built-in default (IMPULSE_ADMIN_PASSCODE)");
    }

    // Initialize backend collaborators
    let pool = db::init_database(&config.store).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let auth = Arc::new(LocalAuth::new(config.store.trusted_tokens.clone()));

    let site = SiteApp::new(
        auth,
        store,
        SiteSettings {
            deployment_id: config.deployment_id.clone(),
            initial_auth_token: config.initial_auth_token.clone(),
            admin_passcode: config.admin_passcode.clone(),
        },
    )?;
    site.start().await;

    // Create application state
    let state = AppState {
        site: Arc::clone(&site),
        sessions: Arc::new(SessionRegistry::new(config.session_idle_ttl)),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    site.shutdown().await;
    tracing::info!("Shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let sessions = Arc::clone(&state.sessions);

    // Admin view routes
    let admin_routes = Router::new()
        .route("/inquiries", get(api::list_inquiries))
        .route("/config", get(api::get_site_config))
        .route("/config", put(api::update_site_config))
        .layer(middleware::from_fn(move |req, next| {
            auth::admin_view_layer(sessions.clone(), req, next)
        }));

    // Public routes
    let api_routes = Router::new()
        // UI sessions
        .route("/sessions", post(api::create_session))
        .route(
            "/sessions/{id}",
            get(api::get_page).delete(api::delete_session),
        )
        .route("/sessions/{id}/login/open", post(api::open_login))
        .route("/sessions/{id}/login/close", post(api::close_login))
        .route("/sessions/{id}/passcode", put(api::set_passcode))
        .route("/sessions/{id}/login", post(api::login))
        .route("/sessions/{id}/logout", post(api::logout))
        // Inquiries
        .route("/inquiries", post(api::submit_inquiry))
        .nest("/admin", admin_routes);

    // Health check
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
