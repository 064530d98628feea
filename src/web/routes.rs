use super::handlers;
use super::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// Extra room for the other multipart fields next to the avatar file.
const FORM_OVERHEAD: usize = 64 * 1024;

pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::public::home))
        .route("/stories", get(handlers::public::stories_index))
        .route("/stories/:id", get(handlers::public::story))
        .route("/authors", get(handlers::public::authors))
        .route("/profile/:username", get(handlers::public::profile))
        .route("/media/:filename", get(handlers::public::serve_media))
        .route("/static/style.css", get(handlers::public::stylesheet))
        .route("/static/story.js", get(handlers::public::story_script))
        .route("/health", get(handlers::public::health))
}

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/signup",
            get(handlers::auth::signup_form).post(handlers::auth::signup),
        )
        .route(
            "/signin",
            get(handlers::auth::signin_form).post(handlers::auth::signin),
        )
        .route("/signout", post(handlers::auth::signout))
}

pub fn author_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", get(handlers::author::dashboard))
        .route(
            "/write",
            get(handlers::author::write_form).post(handlers::author::save_story),
        )
        .route("/stories/:id/delete", post(handlers::author::delete_story))
        .route("/stories/:id/status", post(handlers::author::set_status))
        .route(
            "/settings",
            get(handlers::author::settings_form).post(handlers::author::update_settings).layer(
                DefaultBodyLimit::max(max_upload_bytes.saturating_add(FORM_OVERHEAD)),
            ),
        )
}

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/stories/:id/like", post(handlers::api::toggle_like))
        .route(
            "/api/stories/:id/bookmark",
            post(handlers::api::toggle_bookmark),
        )
        .route(
            "/api/stories/:id/subscribe",
            post(handlers::api::toggle_subscription),
        )
        .route(
            "/api/stories/:id/comments",
            get(handlers::api::list_comments).post(handlers::api::post_comment),
        )
        .route("/api/authors/:id/follow", post(handlers::api::toggle_follow))
        .route(
            "/api/profiles/:username/works",
            get(handlers::api::author_works),
        )
}
