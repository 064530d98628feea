use crate::models::Profile;
use crate::services::auth;
use crate::web::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::CookieJar;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub const SESSION_COOKIE: &str = "session";

fn session_user(state: &AppState, parts: &Parts) -> Result<Option<Profile>, StatusCode> {
    let cookies = CookieJar::from_headers(&parts.headers);
    match cookies.get(SESSION_COOKIE) {
        Some(c) => auth::validate_session(&state.db, c.value()).map_err(|e| {
            tracing::error!("Session lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }),
        None => Ok(None),
    }
}

/// Signed-in user for HTML pages. Anonymous visitors are sent to the
/// sign-in page.
pub struct CurrentUser(pub Profile);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Response;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let result = session_user(state, parts);
        Box::pin(async move {
            match result {
                Ok(Some(user)) => Ok(CurrentUser(user)),
                Ok(None) => Err(Redirect::to("/signin").into_response()),
                Err(status) => Err(status.into_response()),
            }
        })
    }
}

/// Signed-in user for JSON endpoints. Anonymous callers get a 401 body.
pub struct ApiUser(pub Profile);

impl FromRequestParts<Arc<AppState>> for ApiUser {
    type Rejection = Response;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let result = session_user(state, parts);
        Box::pin(async move {
            match result {
                Ok(Some(user)) => Ok(ApiUser(user)),
                Ok(None) => Err((
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({ "error": "Sign in required" })),
                )
                    .into_response()),
                Err(status) => Err(status.into_response()),
            }
        })
    }
}

pub struct OptionalUser(pub Option<Profile>);

impl FromRequestParts<Arc<AppState>> for OptionalUser {
    type Rejection = StatusCode;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let user = session_user(state, parts).ok().flatten();
        Box::pin(async move { Ok(OptionalUser(user)) })
    }
}
