//! JSON endpoints used by the story page scripts.
//!
//! Toggle responses carry the state and count read back after the write, so
//! the page can show them without keeping its own tally.

use crate::error::ServiceError;
use crate::models::{CommentThread, StoryWithChapters, Toggle};
use crate::services::{comments, engagement, profiles, series, stories};
use crate::web::error::ApiResult;
use crate::web::extractors::ApiUser;
use crate::web::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use std::sync::Arc;

pub async fn toggle_like(
    State(state): State<Arc<AppState>>,
    ApiUser(user): ApiUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Toggle>> {
    Ok(Json(engagement::toggle_like(&state.db, user.id, id)?))
}

pub async fn toggle_bookmark(
    State(state): State<Arc<AppState>>,
    ApiUser(user): ApiUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Toggle>> {
    Ok(Json(engagement::toggle_bookmark(&state.db, user.id, id)?))
}

pub async fn toggle_subscription(
    State(state): State<Arc<AppState>>,
    ApiUser(user): ApiUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Toggle>> {
    Ok(Json(engagement::toggle_subscription(&state.db, user.id, id)?))
}

pub async fn toggle_follow(
    State(state): State<Arc<AppState>>,
    ApiUser(user): ApiUser,
    Path(author_id): Path<i64>,
) -> ApiResult<Json<Toggle>> {
    Ok(Json(engagement::toggle_follow(&state.db, user.id, author_id)?))
}

/// Comments of a readable story. Drafts answer 404 like missing stories.
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<CommentThread>>> {
    stories::get_story(&state.db, id)?
        .filter(|s| s.status.is_visible())
        .ok_or(ServiceError::NotFound("Story"))?;
    Ok(Json(comments::list_comments(&state.db, id)?))
}

#[derive(Deserialize)]
pub struct NewComment {
    content: String,
    parent_id: Option<i64>,
}

pub async fn post_comment(
    State(state): State<Arc<AppState>>,
    ApiUser(user): ApiUser,
    Path(id): Path<i64>,
    Json(body): Json<NewComment>,
) -> ApiResult<(StatusCode, Json<CommentThread>)> {
    let comment = comments::post_comment(&state.db, user.id, id, body.parent_id, &body.content)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// An author's visible works with chapters attached, newest first.
pub async fn author_works(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> ApiResult<Json<Vec<StoryWithChapters>>> {
    let author = profiles::get_profile_by_username(&state.db, &username)?
        .ok_or(ServiceError::NotFound("Author"))?;
    let works = series::materialize(stories::list_visible_by_author(&state.db, author.id)?);
    Ok(Json(works))
}
