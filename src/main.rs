//! Forum Topics Backend
//!
//! Serves forum topics, their tag sets and in-topic discussion over REST,
//! persisting everything in SQLite.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod tags;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    tracing::info!(
        db = ?config.db_path,
        bind = %config.bind_addr,
        "Starting Forum Topics Backend"
    );
    if config.api_psk.is_none() {
        tracing::warn!(
            "{} is not set; /api accepts requests without a gateway key",
            config::keys::API_PSK
        );
    }

    let pool = db::init_database(&config.db_path, config.db_max_connections).await?;
    let bind_addr = config.bind_addr;
    let app = create_router(AppState {
        repo: Arc::new(Repository::new(pool)),
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// `RUST_LOG` wins over the configured level when both are present.
fn init_tracing(fallback_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the full application: gateway-checked `/api` plus an open `/health`.
pub fn create_router(state: AppState) -> Router {
    let psk = state.config.api_psk.clone();
    let api = topic_routes()
        .merge(community_routes())
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_check))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Topics, their tag index and everything that lives inside a topic.
fn topic_routes() -> Router<AppState> {
    Router::new()
        .route("/topics", get(api::list_topics).post(api::create_topic))
        .route(
            "/topics/{id}",
            get(api::get_topic)
                .put(api::update_topic)
                .delete(api::delete_topic),
        )
        .route("/topics/{id}/archive", post(api::archive_topic))
        .route("/topics/{id}/unarchive", post(api::unarchive_topic))
        .route("/topics/{id}/moderation", put(api::moderate_topic))
        .route(
            "/topics/{id}/chats",
            get(api::get_topic_chats).post(api::post_chat),
        )
        .route(
            "/topics/{id}/tasks",
            get(api::get_topic_tasks).post(api::create_task),
        )
        .route("/topics/{id}/pins", post(api::pin_message))
        .route("/topics/{id}/announcements", post(api::create_announcement))
        .route("/tasks/{id}/complete", post(api::complete_task))
        .route("/tags", get(api::list_tags))
}

/// Categories and user accounts.
fn community_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/categories",
            get(api::list_categories).post(api::create_category),
        )
        .route("/categories/{id}/archive", post(api::archive_category))
        .route("/categories/{id}/unarchive", post(api::unarchive_category))
        .route("/users", post(api::create_user))
        .route("/users/{id}/status", put(api::update_user_status))
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
