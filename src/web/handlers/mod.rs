pub mod api;
pub mod auth;
pub mod author;
pub mod public;

use crate::models::Profile;
use crate::web::error::AppResult;
use crate::web::flash::{self, Flash};
use crate::web::state::AppState;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use tera::Context;

const MAX_PAGE: usize = 10000;

#[derive(Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    page: usize,
}

fn default_page() -> usize {
    1
}

impl Pagination {
    pub fn page(&self) -> usize {
        self.page.clamp(1, MAX_PAGE)
    }
}

pub(crate) fn total_pages(total: i64, per_page: usize) -> usize {
    (total.max(0) as usize).div_ceil(per_page.max(1)).max(1)
}

pub(crate) fn make_context(state: &AppState, user: &Option<Profile>, flash: Option<Flash>) -> Context {
    let mut ctx = Context::new();
    ctx.insert("site", &state.config.site);
    ctx.insert("user", user);
    ctx.insert("flash", &flash);
    ctx
}

/// Renders `template` with the pending flash notice consumed.
pub(crate) fn render_page(
    state: &AppState,
    jar: CookieJar,
    template: &str,
    mut ctx: Context,
) -> AppResult<Response> {
    let (jar, notice) = flash::take(jar);
    if notice.is_some() {
        ctx.insert("flash", &notice);
    }
    let html = state.templates.render(template, &ctx)?;
    Ok((jar, Html(html)).into_response())
}

pub(crate) fn not_found_page(state: &AppState, user: &Option<Profile>) -> AppResult<Response> {
    let ctx = make_context(state, user, None);
    let html = state.templates.render("404.html", &ctx)?;
    Ok((StatusCode::NOT_FOUND, Html(html)).into_response())
}

/// Parses an optional numeric form field, treating blanks as absent.
pub(crate) fn parse_optional_id(raw: Option<&str>) -> Option<i64> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}
