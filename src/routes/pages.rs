use askama::Template;
use axum::extract::{Form, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;

use crate::blog::domain;
use crate::blog::repository::BlogRepository;
use crate::db::models::{Comment, Post, Rating, User};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::flash::{self, flash_redirect, Flash, FlashMessage};
use crate::ratelimit::{self, RateLimiter, RouteQuota};
use crate::state::AppState;

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

#[derive(Template)]
#[template(path = "pages/about.html")]
struct AboutTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
}

#[derive(Template)]
#[template(path = "pages/error.html")]
struct ErrorTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
}

#[derive(Template)]
#[template(path = "pages/account.html")]
struct AccountTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    ratings: Vec<Rating>,
}

#[derive(Template)]
#[template(path = "pages/contact.html")]
struct ContactTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
    site_key: Option<String>,
}

#[derive(Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub message: String,
    #[serde(rename = "g-recaptcha-response", default)]
    pub captcha_response: String,
}

pub fn router(limiter: Arc<RateLimiter>) -> Router<AppState> {
    let contact = Router::new()
        .route("/contact", get(contact_page).post(contact_submit))
        .route_layer(axum::middleware::from_fn_with_state(
            RouteQuota::per_hour(limiter, "contact", 5),
            ratelimit::enforce,
        ));

    Router::new()
        .route("/about", get(about))
        .route("/error", get(error_page))
        .route("/account", get(account))
        .merge(contact)
}

async fn about(maybe_user: MaybeUser, flash: Flash) -> Response {
    let template = AboutTemplate {
        user: maybe_user.0,
        flash: flash.0.clone(),
    };
    flash::render(&flash, Html(template))
}

/// Safe landing page for failure redirects.
async fn error_page(maybe_user: MaybeUser, flash: Flash) -> Response {
    let template = ErrorTemplate {
        user: maybe_user.0,
        flash: flash.0.clone(),
    };
    flash::render(&flash, Html(template))
}

/// The signed-in user's own posts, comments, and ratings.
async fn account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    flash: Flash,
) -> AppResult<Response> {
    let posts = state.repo.posts_by_author(user.id).await?;
    let comments = state.repo.comments_by_author(user.id).await?;
    let ratings = state.repo.ratings_by_author(user.id).await?;

    let template = AccountTemplate {
        user: Some(user),
        flash: flash.0.clone(),
        posts,
        comments,
        ratings,
    };
    Ok(flash::render(&flash, Html(template)))
}

async fn contact_page(State(state): State<AppState>, maybe_user: MaybeUser, flash: Flash) -> Response {
    let template = ContactTemplate {
        user: maybe_user.0,
        flash: flash.0.clone(),
        site_key: state.config.captcha_site_key(),
    };
    flash::render(&flash, Html(template))
}

async fn contact_submit(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Form(form): Form<ContactForm>,
) -> AppResult<Response> {
    if maybe_user.0.is_none() {
        return Ok(flash_redirect(
            "error",
            "You need to log in to send a message.",
            "/login",
        ));
    }

    if !state.captcha.verify(&form.captcha_response).await {
        return Ok(flash_redirect(
            "error",
            "Captcha verification failed. Please try again.",
            "/contact",
        ));
    }

    let name = domain::sanitize_text(&form.name);
    let phone = domain::sanitize_text(&form.phone);
    let email = form.email.trim().to_lowercase();
    let message = domain::sanitize_text(&form.message);

    if name.is_empty() || phone.is_empty() || email.is_empty() || message.is_empty() {
        return Ok(flash_redirect(
            "error",
            "Please fill all required fields.",
            "/contact",
        ));
    }
    if !domain::validate_email(&email) {
        return Ok(flash_redirect(
            "error",
            "Please enter a valid email address.",
            "/contact",
        ));
    }

    let subject = format!("New question for the blog from {}", name);
    let body = format!(
        "Name: {}\nEmail: {}\nPhone: {}\nMessage:\n{}",
        name, email, phone, message
    );

    if !state.notifier.email(&subject, &body, None).await {
        return Ok(flash_redirect(
            "error",
            "There was an error sending your message.",
            "/contact",
        ));
    }

    Ok(flash_redirect(
        "success",
        "Your message has been sent.",
        "/contact",
    ))
}
