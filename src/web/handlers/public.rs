use super::{make_context, not_found_page, render_page, total_pages, Pagination};
use crate::models::{ChapterLink, StoryType, ViewerState};
use crate::services::{comments, engagement, media, profiles, series, stories};
use crate::web::error::AppResult;
use crate::web::extractors::OptionalUser;
use crate::web::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::CookieJar;
use std::sync::Arc;
use tera::Context;

const RELATED_LIMIT: usize = 4;
const HOME_AUTHORS: usize = 6;

pub async fn home(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    jar: CookieJar,
) -> AppResult<Response> {
    let content = &state.config.content;
    let featured = stories::list_featured(&state.db, content.featured_count)?;
    let latest = stories::list_published(&state.db, content.stories_per_page, 0)?;
    let authors = profiles::list_authors(&state.db, HOME_AUTHORS, 0)?;

    let mut ctx = make_context(&state, &user, None);
    ctx.insert("featured", &featured);
    ctx.insert("latest", &latest);
    ctx.insert("authors", &authors);

    render_page(&state, jar, "home.html", ctx)
}

pub async fn stories_index(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Query(pagination): Query<Pagination>,
    jar: CookieJar,
) -> AppResult<Response> {
    let per_page = state.config.content.stories_per_page;
    let page = pagination.page();
    let offset = (page - 1) * per_page;
    let list = stories::list_published(&state.db, per_page, offset)?;
    let total = stories::count_published(&state.db)?;

    let mut ctx = make_context(&state, &user, None);
    ctx.insert("stories", &list);
    ctx.insert("page", &page);
    ctx.insert("total_pages", &total_pages(total, per_page));

    render_page(&state, jar, "stories.html", ctx)
}

pub async fn story(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Path(id): Path<i64>,
    jar: CookieJar,
) -> AppResult<Response> {
    let Some(found) = stories::get_story_with_author(&state.db, id)? else {
        return not_found_page(&state, &user);
    };
    let is_owner = user.as_ref().is_some_and(|u| u.id == found.story.author_id);
    if !found.story.status.is_visible() && !is_owner {
        return not_found_page(&state, &user);
    }
    if !is_owner && found.story.status.is_visible() {
        stories::record_view(&state.db, id)?;
    }

    let story = &found.story;
    let (chapters, navigation, series_root) = if story.story_type == StoryType::OneTime {
        (Vec::new(), None, None)
    } else {
        let chapters = stories::series_chapters(&state.db, story.root_id())?;
        let navigation = series::chapter_navigation(story, &chapters);
        let root = chapters
            .iter()
            .find(|c| c.id == story.root_id())
            .map(ChapterLink::from);
        let links: Vec<ChapterLink> = chapters.iter().map(ChapterLink::from).collect();
        (links, navigation, root)
    };

    let viewer = match &user {
        Some(u) => {
            let mut viewer = engagement::viewer_state(&state.db, u.id, id)?;
            // subscriptions live on the root of the work
            if story.root_id() != id {
                viewer.subscribed =
                    engagement::viewer_state(&state.db, u.id, story.root_id())?.subscribed;
            }
            viewer
        }
        None => ViewerState::default(),
    };
    let following = match &user {
        Some(u) if u.id != story.author_id => {
            engagement::is_following(&state.db, u.id, story.author_id)?
        }
        _ => false,
    };

    let mut ctx = make_context(&state, &user, None);
    ctx.insert("story", &found);
    ctx.insert("root_id", &story.root_id());
    ctx.insert("content_html", &state.markdown.render(&story.content));
    ctx.insert(
        "reading_time",
        &state.markdown.calculate_reading_time(&story.content),
    );
    ctx.insert("chapters", &chapters);
    ctx.insert("navigation", &navigation);
    ctx.insert("series_root", &series_root);
    ctx.insert(
        "related",
        &stories::related_stories(&state.db, story, RELATED_LIMIT)?,
    );
    ctx.insert("viewer", &viewer);
    ctx.insert("is_owner", &is_owner);
    ctx.insert("is_following", &following);
    ctx.insert("comments", &comments::list_comments(&state.db, id)?);

    render_page(&state, jar, "story.html", ctx)
}

pub async fn authors(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Query(pagination): Query<Pagination>,
    jar: CookieJar,
) -> AppResult<Response> {
    let per_page = state.config.content.stories_per_page;
    let page = pagination.page();
    let list = profiles::list_authors(&state.db, per_page, (page - 1) * per_page)?;
    let total = profiles::count_authors(&state.db)?;

    let mut ctx = make_context(&state, &user, None);
    ctx.insert("authors", &list);
    ctx.insert("page", &page);
    ctx.insert("total_pages", &total_pages(total, per_page));

    render_page(&state, jar, "authors.html", ctx)
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Path(username): Path<String>,
    jar: CookieJar,
) -> AppResult<Response> {
    let Some(author) = profiles::get_profile_by_username(&state.db, &username)? else {
        return not_found_page(&state, &user);
    };

    let works = series::materialize(stories::list_visible_by_author(&state.db, author.id)?);
    let is_self = user.as_ref().is_some_and(|u| u.id == author.id);
    let following = match &user {
        Some(u) if !is_self => engagement::is_following(&state.db, u.id, author.id)?,
        _ => false,
    };

    let mut ctx = make_context(&state, &user, None);
    ctx.insert("author", &author);
    ctx.insert("author_name", author.display_name_or_username());
    ctx.insert("works", &works);
    ctx.insert("is_self", &is_self);
    ctx.insert("is_following", &following);

    render_page(&state, jar, "profile.html", ctx)
}

pub async fn serve_media(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> AppResult<Response> {
    let Some(file_path) = media::resolve_upload(&state.media_dir, &filename) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let content = match tokio::fs::read(&file_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StatusCode::NOT_FOUND.into_response())
        }
        Err(e) => return Err(e.into()),
    };
    let mime = mime_guess::from_path(&filename).first_or_octet_stream();

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        content,
    )
        .into_response())
}

pub async fn stylesheet(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let css = state.templates.render("css/style.css", &Context::new())?;
    Ok(([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response())
}

pub async fn story_script(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let js = state.templates.render("js/story.js", &Context::new())?;
    Ok((
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        js,
    )
        .into_response())
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let db_ok = state
        .db
        .get()
        .and_then(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?))
        .is_ok();
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "database": db_ok,
        })),
    )
        .into_response()
}

pub async fn fallback(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
) -> AppResult<Response> {
    not_found_page(&state, &user)
}
