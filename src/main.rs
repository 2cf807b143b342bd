mod api;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod models;
mod resources;
mod saves;
mod scrape;
mod update;
mod users;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use config::Config;
use db::Db;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Db,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "casesync_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.jwt_secret_is_fallback {
        tracing::warn!("Running with a generated JWT secret; tokens will not survive a restart");
    }

    let db = Db::open(&config.database_path)?;
    {
        let conn = db.conn().await;
        db::ensure_schema(&conn)?;
    }

    let state = AppState {
        config: config.clone(),
        db,
    };

    let app = Router::new()
        .route("/healthz", get(api::healthz))
        .route("/resources", get(api::list_resources))
        .route("/resources/search", get(api::search_resources))
        .route("/resources/updates", get(api::recent_updates))
        .route("/resources/saved", get(api::list_saved_resources))
        .route("/resources/create", post(api::create_resource))
        .route("/resources/import", post(api::import_resources))
        .route(
            "/resources/normalize-categories",
            post(api::normalize_categories),
        )
        .route(
            "/resources/{id}",
            get(api::get_resource).put(api::update_resource),
        )
        .route("/resources/{id}/notes", post(api::add_resource_note))
        .route(
            "/resources/{id}/save",
            post(api::save_resource).delete(api::unsave_resource),
        )
        .route("/scrape", post(api::run_scrape))
        .route("/auth/register", post(api::register))
        .route("/auth/login", post(api::login))
        .route("/auth/me", get(api::me))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("casesync-api listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
