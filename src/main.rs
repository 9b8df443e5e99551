mod cli;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod store;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::db::Database;
use crate::services::PinAttemptLimiter;
use crate::store::{FeedResolver, ShareResolver, SqliteStore};

/// Application state shared across handlers.
///
/// Public handlers get token-scoped resolvers only, not the database.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub shares: Arc<dyn ShareResolver>,
    pub feeds: Arc<dyn FeedResolver>,
    pub pin_limiter: Arc<PinAttemptLimiter>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pawshare=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PawShare...");

    // Load configuration
    let config = Arc::new(Config::load()?);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    let store = SqliteStore::new(db);
    match args.command {
        Some(Command::Share(command)) => return cli::run_share(&store, &config, command).await,
        Some(Command::Feed(command)) => return cli::run_feed(&store, &config, command).await,
        Some(Command::Serve) | None => {}
    }

    let store = Arc::new(store);
    let state = AppState {
        config: config.clone(),
        shares: store.clone(),
        feeds: store,
        pin_limiter: Arc::new(PinAttemptLimiter::from_config(&config.share)),
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    // Share links and feeds are opened from arbitrary origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/share/:token", get(handlers::share::get_share))
        .route("/share/:token/verify", post(handlers::share::verify_share))
        .route("/calendar/:token", get(handlers::calendar::get_calendar))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
fn test_state(store: services::share::fakes::FakeStore) -> AppState {
    let config = Config::default();
    let store = Arc::new(store);
    AppState {
        pin_limiter: Arc::new(PinAttemptLimiter::from_config(&config.share)),
        config: Arc::new(config),
        shares: store.clone(),
        feeds: store,
    }
}
