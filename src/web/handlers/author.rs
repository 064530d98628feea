use super::{make_context, parse_optional_id, render_page};
use crate::error::{user_message, ServiceError};
use crate::models::{Profile, SaveMode, Story, StoryInput, StoryType, UpdateProfile};
use crate::services::{media, profiles, series, stories};
use crate::web::error::AppResult;
use crate::web::extractors::CurrentUser;
use crate::web::flash::{self, Flash};
use crate::web::state::AppState;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Serialize)]
struct DashboardStats {
    works: usize,
    published: usize,
    drafts: usize,
    views: i64,
    likes: i64,
    comments: i64,
}

impl DashboardStats {
    fn from_records(records: &[Story], works: usize) -> Self {
        let mut stats = DashboardStats {
            works,
            ..Default::default()
        };
        for s in records {
            if s.status.is_visible() {
                stats.published += 1;
            } else {
                stats.drafts += 1;
            }
            stats.views += s.views_count;
            stats.likes += s.likes_count;
            stats.comments += s.comments_count;
        }
        stats
    }
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> AppResult<Response> {
    let records = stories::list_author_stories(&state.db, user.id)?;
    let works = series::materialize(records.iter().cloned());
    let stats = DashboardStats::from_records(&records, works.len());

    let mut ctx = make_context(&state, &Some(user), None);
    ctx.insert("works", &works);
    ctx.insert("stats", &stats);

    render_page(&state, jar, "dashboard.html", ctx)
}

#[derive(Deserialize)]
pub struct WriteQuery {
    edit: Option<i64>,
    series: Option<i64>,
}

/// Values shown in the editor, either from a saved story or from a
/// rejected submission.
#[derive(Debug, Default, Serialize)]
struct EditorFields {
    id: Option<i64>,
    title: String,
    content: String,
    excerpt: String,
    cover_image_url: String,
    story_type: StoryType,
    genre: String,
    tags: String,
    series_id: Option<i64>,
    chapter_number: Option<i64>,
    status: Option<String>,
}

impl From<&Story> for EditorFields {
    fn from(story: &Story) -> Self {
        Self {
            id: Some(story.id),
            title: story.title.clone(),
            content: story.content.clone(),
            excerpt: story.excerpt.clone().unwrap_or_default(),
            cover_image_url: story.cover_image_url.clone().unwrap_or_default(),
            story_type: story.story_type,
            genre: story.genre.clone().unwrap_or_default(),
            tags: story.tags.join(", "),
            series_id: story.series_id,
            chapter_number: Some(story.chapter_number),
            status: Some(story.status.to_string()),
        }
    }
}

fn render_editor(
    state: &AppState,
    jar: CookieJar,
    user: Profile,
    fields: EditorFields,
    error: Option<String>,
) -> AppResult<Response> {
    let parents = stories::list_parent_series(&state.db, user.id)?;
    let next_chapter = match fields.series_id {
        Some(id) if fields.id.is_none() => Some(stories::next_chapter_number(&state.db, id)?),
        _ => None,
    };

    let status = if error.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    let mut ctx = make_context(state, &Some(user), error.map(Flash::error));
    ctx.insert("story", &fields);
    ctx.insert("parents", &parents);
    ctx.insert("next_chapter", &next_chapter);
    ctx.insert("max_tags", &state.config.content.max_tags);

    if status == StatusCode::OK {
        render_page(state, jar, "write.html", ctx)
    } else {
        let html = state.templates.render("write.html", &ctx)?;
        Ok((status, Html(html)).into_response())
    }
}

pub async fn write_form(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<WriteQuery>,
    jar: CookieJar,
) -> AppResult<Response> {
    let fields = match query.edit {
        Some(id) => {
            let story = stories::get_story(&state.db, id)?
                .ok_or(ServiceError::NotFound("Story"))?;
            if story.author_id != user.id {
                return Err(ServiceError::Forbidden("You can only edit your own stories").into());
            }
            EditorFields::from(&story)
        }
        None => {
            let parent = match query.series {
                Some(id) => stories::get_owned_story(&state.db, user.id, id)?
                    .filter(|s| s.is_series_root()),
                None => None,
            };
            EditorFields {
                story_type: parent.as_ref().map(|p| p.story_type).unwrap_or_default(),
                series_id: parent.map(|p| p.id),
                ..Default::default()
            }
        }
    };

    render_editor(&state, jar, user, fields, None)
}

#[derive(Deserialize)]
pub struct StoryForm {
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    excerpt: Option<String>,
    cover_image_url: Option<String>,
    story_type: Option<String>,
    genre: Option<String>,
    #[serde(default)]
    tags: String,
    series_id: Option<String>,
    chapter_number: Option<String>,
    #[serde(default)]
    action: SaveMode,
}

impl StoryForm {
    fn to_input(&self) -> StoryInput {
        StoryInput {
            title: self.title.clone(),
            content: self.content.clone(),
            excerpt: self.excerpt.clone(),
            cover_image_url: self.cover_image_url.clone(),
            story_type: self
                .story_type
                .as_deref()
                .and_then(|t| t.parse().ok())
                .unwrap_or_default(),
            genre: self.genre.clone(),
            tags: stories::split_tags(&self.tags),
            series_id: parse_optional_id(self.series_id.as_deref()),
            chapter_number: parse_optional_id(self.chapter_number.as_deref()),
        }
    }

    fn to_fields(&self) -> EditorFields {
        let input = self.to_input();
        EditorFields {
            id: parse_optional_id(self.id.as_deref()),
            title: input.title,
            content: input.content,
            excerpt: input.excerpt.unwrap_or_default(),
            cover_image_url: input.cover_image_url.unwrap_or_default(),
            story_type: input.story_type,
            genre: input.genre.unwrap_or_default(),
            tags: self.tags.clone(),
            series_id: input.series_id,
            chapter_number: input.chapter_number,
            status: None,
        }
    }
}

pub async fn save_story(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Form(form): Form<StoryForm>,
) -> AppResult<Response> {
    let rules = &state.config.content;
    let result = match parse_optional_id(form.id.as_deref()) {
        Some(id) => stories::update_story(&state.db, rules, user.id, id, form.to_input(), form.action),
        None => stories::create_story(&state.db, rules, user.id, form.to_input(), form.action),
    };

    match result {
        Ok(story) => {
            let (message, target) = match form.action {
                SaveMode::Publish => ("Story published!", format!("/stories/{}", story.id)),
                SaveMode::Draft => ("Draft saved.", format!("/write?edit={}", story.id)),
            };
            let jar = flash::set(jar, Flash::success(message));
            Ok((jar, Redirect::to(&target)).into_response())
        }
        Err(e) => match user_message(&e) {
            Some(message) => render_editor(&state, jar, user, form.to_fields(), Some(message)),
            None => Err(e.into()),
        },
    }
}

pub async fn delete_story(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    jar: CookieJar,
) -> AppResult<Response> {
    let removed = stories::delete_story(&state.db, user.id, id)?;
    let message = if removed > 1 {
        format!("Deleted the story and {} chapters.", removed - 1)
    } else {
        "Story deleted.".to_string()
    };
    let jar = flash::set(jar, Flash::success(message));
    Ok((jar, Redirect::to("/dashboard")).into_response())
}

#[derive(Deserialize)]
pub struct StatusForm {
    status: String,
}

pub async fn set_status(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    jar: CookieJar,
    Form(form): Form<StatusForm>,
) -> AppResult<Response> {
    let status = stories::parse_status(&form.status)?;
    let flash_msg = match stories::set_status(&state.db, user.id, id, status) {
        Ok(story) => Flash::success(format!("\"{}\" is now {}.", story.title, status.to_string().replace('_', " "))),
        Err(e) => match user_message(&e) {
            Some(message) => Flash::error(message),
            None => return Err(e.into()),
        },
    };
    let jar = flash::set(jar, flash_msg);
    Ok((jar, Redirect::to("/dashboard")).into_response())
}

pub async fn settings_form(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> AppResult<Response> {
    let ctx = make_context(&state, &Some(user), None);
    render_page(&state, jar, "settings.html", ctx)
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut input = UpdateProfile::default();
    let mut avatar: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "avatar" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                if !file_name.is_empty() && !data.is_empty() {
                    avatar = Some((file_name, data.to_vec()));
                }
            }
            "display_name" => input.display_name = Some(field.text().await?),
            "bio" => input.bio = Some(field.text().await?),
            "location" => input.location = Some(field.text().await?),
            "website" => input.website = Some(field.text().await?),
            _ => {}
        }
    }

    let result = (|| -> anyhow::Result<Profile> {
        profiles::validate_update(&input)?;

        let previous_avatar = user.avatar_url.clone();
        if let Some((file_name, data)) = &avatar {
            let max_bytes = state.config.media.max_upload_bytes()?;
            input.avatar_url = Some(media::save_avatar(
                &state.media_dir,
                user.id,
                file_name,
                data,
                max_bytes,
            )?);
        }
        let new_avatar = input.avatar_url.clone();

        let profile = match profiles::update_profile(&state.db, user.id, input) {
            Ok(profile) => profile,
            Err(e) => {
                if let Some(new) = &new_avatar {
                    discard_upload(&state, new);
                }
                return Err(e);
            }
        };
        if let (Some(old), Some(_)) = (previous_avatar, new_avatar) {
            discard_upload(&state, &old);
        }
        Ok(profile)
    })();

    match result {
        Ok(_) => {
            let jar = flash::set(jar, Flash::success("Profile updated."));
            Ok((jar, Redirect::to("/settings")).into_response())
        }
        Err(e) => match user_message(&e) {
            Some(message) => {
                let ctx = make_context(&state, &Some(user), Some(Flash::error(message)));
                let html = state.templates.render("settings.html", &ctx)?;
                Ok((StatusCode::BAD_REQUEST, Html(html)).into_response())
            }
            None => Err(e.into()),
        },
    }
}

fn discard_upload(state: &AppState, url: &str) {
    if let Err(e) = media::remove_upload(&state.media_dir, url) {
        tracing::warn!("Failed to remove avatar {}: {}", url, e);
    }
}
