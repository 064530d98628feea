use super::{make_context, render_page};
use crate::error::user_message;
use crate::models::{Profile, Signup};
use crate::services::auth;
use crate::web::error::AppResult;
use crate::web::extractors::{OptionalUser, SESSION_COOKIE};
use crate::web::flash::{self, Flash};
use crate::web::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;
use time::Duration;

fn session_cookie(token: String, days: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(days))
        .build()
}

fn start_session(state: &AppState, jar: CookieJar, user_id: i64) -> AppResult<CookieJar> {
    let days = state.config.auth.session_days()?;
    let token = auth::create_session(&state.db, user_id, days)?;
    Ok(jar.add(session_cookie(token, days)))
}

pub async fn signup_form(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    jar: CookieJar,
) -> AppResult<Response> {
    if user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    let ctx = make_context(&state, &user, None);
    render_page(&state, jar, "auth/signup.html", ctx)
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<Signup>,
) -> AppResult<Response> {
    match auth::signup(&state.db, &state.config.auth, &form) {
        Ok(user_id) => {
            let jar = start_session(&state, jar, user_id)?;
            let jar = flash::set(jar, Flash::success("Welcome to HeartEcho! Your account is ready."));
            Ok((jar, Redirect::to("/dashboard")).into_response())
        }
        Err(e) => match user_message(&e) {
            Some(message) => {
                let mut ctx = make_context(&state, &None, Some(Flash::error(message)));
                ctx.insert("username", &form.username);
                ctx.insert("email", &form.email);
                ctx.insert("display_name", &form.display_name);
                let html = state.templates.render("auth/signup.html", &ctx)?;
                Ok((StatusCode::BAD_REQUEST, Html(html)).into_response())
            }
            None => Err(e.into()),
        },
    }
}

pub async fn signin_form(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    jar: CookieJar,
) -> AppResult<Response> {
    if user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    let ctx = make_context(&state, &user, None);
    render_page(&state, jar, "auth/signin.html", ctx)
}

#[derive(Deserialize)]
pub struct SigninForm {
    login: String,
    password: String,
}

fn signin_error(state: &AppState, status: StatusCode, login: &str, message: &str) -> AppResult<Response> {
    let mut ctx = make_context(state, &None::<Profile>, Some(Flash::error(message)));
    ctx.insert("login", login);
    let html = state.templates.render("auth/signin.html", &ctx)?;
    Ok((status, Html(html)).into_response())
}

pub async fn signin(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<SigninForm>,
) -> AppResult<Response> {
    let rate_key = format!("signin:{}", form.login.trim().to_lowercase());
    if !state.rate_limiter.check(&rate_key) {
        tracing::warn!(login = %form.login.trim(), "Sign-in rate limited");
        return signin_error(
            &state,
            StatusCode::TOO_MANY_REQUESTS,
            &form.login,
            "Too many sign-in attempts. Please try again later.",
        );
    }

    match auth::authenticate(&state.db, &form.login, &form.password)? {
        Some(user) => {
            state.rate_limiter.clear(&rate_key);
            let jar = start_session(&state, jar, user.id)?;
            tracing::info!(user_id = user.id, "Signed in");
            let jar = flash::set(
                jar,
                Flash::success(format!("Welcome back, {}!", user.display_name_or_username())),
            );
            Ok((jar, Redirect::to("/dashboard")).into_response())
        }
        None => {
            state.rate_limiter.record_attempt(&rate_key);
            signin_error(
                &state,
                StatusCode::UNAUTHORIZED,
                &form.login,
                "Invalid email, username or password",
            )
        }
    }
}

pub async fn signout(State(state): State<Arc<AppState>>, jar: CookieJar) -> AppResult<Response> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(e) = auth::delete_session(&state.db, cookie.value()) {
            tracing::warn!("Failed to delete session: {}", e);
        }
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    let jar = flash::set(jar, Flash::success("You have been signed out."));
    Ok((jar, Redirect::to("/")).into_response())
}
