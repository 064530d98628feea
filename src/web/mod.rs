mod error;
mod extractors;
mod flash;
mod handlers;
mod routes;
pub mod security;
mod state;

pub use state::AppState;

use crate::services::auth;
use crate::{Config, Database};
use anyhow::Result;
use axum::middleware;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Builds the full application router around `state`.
pub fn router(state: Arc<AppState>) -> Result<Router> {
    let max_upload = state.config.media.max_upload_bytes()?;

    Ok(Router::new()
        .merge(routes::public_routes())
        .merge(routes::auth_routes())
        .merge(routes::author_routes(max_upload))
        .merge(routes::api_routes())
        .fallback(handlers::public::fallback)
        .layer(middleware::from_fn(security::apply_security_headers))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

pub async fn serve(config: Config, db: Database) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, db.clone())?);

    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match auth::cleanup_expired_sessions(&db) {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired sessions", n),
                Err(e) => tracing::error!("Session cleanup failed: {}", e),
            }
            limiter.cleanup();
        }
    });

    let app = router(state)?;

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("HeartEcho listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
