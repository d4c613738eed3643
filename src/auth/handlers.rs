use askama::Template;
use axum::extract::{Form, State};
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::auth::session;
use crate::blog::domain;
use crate::blog::repository::{BlogRepository, StoreError};
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{extract_session_token, MaybeUser};
use crate::flash::{self, flash_redirect, Flash, FlashMessage};
use crate::routes::pages::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/register.html")]
pub struct RegisterTemplate {
    pub user: Option<User>,
    pub flash: Option<FlashMessage>,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub user: Option<User>,
    pub flash: Option<FlashMessage>,
}

#[derive(Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

pub async fn register_page(maybe_user: MaybeUser, flash: Flash) -> Response {
    let template = RegisterTemplate {
        user: maybe_user.0,
        flash: flash.0.clone(),
    };
    flash::render(&flash, Html(template))
}

pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_lowercase();
    if !domain::validate_email(&email) {
        return Ok(flash_redirect("error", "Invalid email format.", "/register"));
    }
    if let Err(msg) = domain::validate_password(&form.password) {
        return Ok(flash_redirect("error", &msg, "/register"));
    }
    let name = domain::sanitize_text(&form.name);
    if name.is_empty() {
        return Ok(flash_redirect("error", "Name is required.", "/register"));
    }

    let password_hash = bcrypt::hash(&form.password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Storage(e.to_string()))?;

    match state.repo.insert_user(&email, &password_hash, &name).await {
        Ok(user) => {
            tracing::info!("Registered user {} ({})", user.id, user.email);
            Ok(log_in(&state, user.id)?)
        }
        Err(StoreError::ConstraintViolation(_)) => Ok(flash_redirect(
            "error",
            "Email already registered. Please log in.",
            "/login",
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn login_page(maybe_user: MaybeUser, flash: Flash) -> Response {
    let template = LoginTemplate {
        user: maybe_user.0,
        flash: flash.0.clone(),
    };
    flash::render(&flash, Html(template))
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_lowercase();

    let Some(user) = state.repo.user_by_email(&email).await? else {
        return Ok(flash_redirect("error", "Email not found!", "/login"));
    };

    if !bcrypt::verify(&form.password, &user.password_hash).unwrap_or(false) {
        return Ok(flash_redirect(
            "error",
            "Password incorrect, please try again.",
            "/login",
        ));
    }

    Ok(log_in(&state, user.id)?)
}

pub async fn logout(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> AppResult<Response> {
    if let Some(token) = extract_session_token(&headers, &state.config.auth.cookie_name) {
        session::delete_session(&state.db, &token)?;
    }
    let cookie = session::clear_session_cookie(&state.config.auth.cookie_name);
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

/// Create a session for the user and land them on the post listing.
fn log_in(state: &AppState, user_id: i64) -> AppResult<Response> {
    let token = session::create_session(&state.db, user_id, state.config.auth.session_hours)?;
    let cookie = session::session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.session_hours,
    );
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}
