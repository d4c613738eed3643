use askama::Template;
use axum::extract::{Form, Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;

use crate::blog::domain;
use crate::blog::repository::{BlogRepository, NewPost, PostChanges, StoreError};
use crate::db::models::{Comment, Post, User};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::flash::{self, flash_redirect, Flash, FlashMessage};
use crate::ratelimit::{self, RateLimiter, RouteQuota};
use crate::routes::pages::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/index.html")]
struct IndexTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
    posts: Vec<Post>,
}

#[derive(Template)]
#[template(path = "pages/post.html")]
struct PostTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
    post: Post,
    comments: Vec<Comment>,
    mean: f64,
    rating_count: usize,
    can_edit: bool,
}

#[derive(Template)]
#[template(path = "pages/make_post.html")]
struct MakePostTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
    is_edit: bool,
    post_id: i64,
    title: String,
    subtitle: String,
    img_url: String,
    body: String,
}

#[derive(Deserialize)]
pub struct PostForm {
    pub title: String,
    pub subtitle: String,
    pub img_url: String,
    pub body: String,
}

struct ValidPost {
    title: String,
    subtitle: String,
    img_url: String,
    body: String,
}

pub fn router(limiter: Arc<RateLimiter>) -> Router<AppState> {
    let compose = Router::new()
        .route("/new-post", get(new_post_page).post(create_post))
        .route("/edit-post/{id}", get(edit_post_page).post(update_post))
        .route_layer(axum::middleware::from_fn_with_state(
            RouteQuota::per_hour(limiter.clone(), "compose-post", 5),
            ratelimit::enforce,
        ));
    let delete = Router::new()
        .route("/delete-post/{id}", post(delete_post))
        .route_layer(axum::middleware::from_fn_with_state(
            RouteQuota::per_hour(limiter, "delete-post", 3),
            ratelimit::enforce,
        ));

    Router::new()
        .route("/", get(index))
        .route("/post/{id}", get(show_post))
        .merge(compose)
        .merge(delete)
}

/// Post listing; world-readable, no authorization gate.
async fn index(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    flash: Flash,
) -> AppResult<Response> {
    let posts = state.repo.list_posts().await?;
    let template = IndexTemplate {
        user: maybe_user.0,
        flash: flash.0.clone(),
        posts,
    };
    Ok(flash::render(&flash, Html(template)))
}

async fn show_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    maybe_user: MaybeUser,
    flash: Flash,
) -> AppResult<Response> {
    let Some(post) = state.repo.post_by_id(id).await? else {
        return Ok(flash_redirect("error", "Post record not found.", "/error"));
    };

    let comments = state.repo.comments_for_post(id).await?;
    let ratings = state.repo.ratings_for_post(id).await?;
    let mean = domain::mean_rating(&ratings);
    let can_edit = maybe_user
        .0
        .as_ref()
        .map(|u| domain::can_modify_post(u, &post))
        .unwrap_or(false);

    let template = PostTemplate {
        user: maybe_user.0,
        flash: flash.0.clone(),
        post,
        comments,
        mean,
        rating_count: ratings.len(),
        can_edit,
    };
    Ok(flash::render(&flash, Html(template)))
}

async fn new_post_page(CurrentUser(user): CurrentUser, flash: Flash) -> Response {
    if !domain::can_create_post(&user) {
        return flash_redirect(
            "error",
            "You are not allowed to add posts, request permission on the home page.",
            "/error",
        );
    }

    let template = MakePostTemplate {
        user: Some(user),
        flash: flash.0.clone(),
        is_edit: false,
        post_id: 0,
        title: String::new(),
        subtitle: String::new(),
        img_url: String::new(),
        body: String::new(),
    };
    flash::render(&flash, Html(template))
}

async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    if !domain::can_create_post(&user) {
        return Ok(flash_redirect(
            "error",
            "You are not allowed to add posts, request permission on the home page.",
            "/error",
        ));
    }

    let valid = match validate_post_form(&form) {
        Ok(valid) => valid,
        Err(msg) => return Ok(flash_redirect("error", &msg, "/new-post")),
    };

    let date = chrono::Utc::now().format("%B %d, %Y").to_string();
    let result = state
        .repo
        .insert_post(NewPost {
            author_id: user.id,
            title: &valid.title,
            subtitle: &valid.subtitle,
            body: &valid.body,
            img_url: &valid.img_url,
            date: &date,
        })
        .await;

    match result {
        Ok(post) => {
            tracing::info!("User {} published post {}", user.id, post.id);
            Ok(Redirect::to("/").into_response())
        }
        Err(StoreError::ConstraintViolation(_)) => Ok(flash_redirect(
            "error",
            "This title already exists.",
            "/new-post",
        )),
        Err(e) => Err(e.into()),
    }
}

async fn edit_post_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
    flash: Flash,
) -> AppResult<Response> {
    let Some(post) = state.repo.post_by_id(id).await? else {
        return Ok(flash_redirect("error", "Post record not found.", "/account"));
    };
    if !domain::can_modify_post(&user, &post) {
        return Ok(flash_redirect(
            "error",
            "You are not allowed to edit this post!",
            "/account",
        ));
    }

    let template = MakePostTemplate {
        user: Some(user),
        flash: flash.0.clone(),
        is_edit: true,
        post_id: post.id,
        title: post.title,
        subtitle: post.subtitle,
        img_url: post.img_url,
        body: post.body,
    };
    Ok(flash::render(&flash, Html(template)))
}

async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let Some(post) = state.repo.post_by_id(id).await? else {
        return Ok(flash_redirect("error", "Post record not found.", "/account"));
    };
    if !domain::can_modify_post(&user, &post) {
        return Ok(flash_redirect(
            "error",
            "You are not allowed to edit this post!",
            "/account",
        ));
    }

    let edit_path = format!("/edit-post/{}", id);
    let valid = match validate_post_form(&form) {
        Ok(valid) => valid,
        Err(msg) => return Ok(flash_redirect("error", &msg, &edit_path)),
    };

    let result = state
        .repo
        .update_post(
            id,
            PostChanges {
                title: &valid.title,
                subtitle: &valid.subtitle,
                body: &valid.body,
                img_url: &valid.img_url,
            },
        )
        .await;

    match result {
        Ok(()) => Ok(Redirect::to(&format!("/post/{}", id)).into_response()),
        Err(StoreError::ConstraintViolation(_)) => Ok(flash_redirect(
            "error",
            "This title already exists.",
            &edit_path,
        )),
        Err(e) => Err(e.into()),
    }
}

async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let Some(post) = state.repo.post_by_id(id).await? else {
        return Ok(flash_redirect("error", "Post record not found.", "/account"));
    };
    if !domain::can_modify_post(&user, &post) {
        return Ok(flash_redirect(
            "error",
            "You are not allowed to delete this post!",
            "/account",
        ));
    }

    state.repo.delete_post(id).await?;
    Ok(flash_redirect(
        "success",
        "The selected post has been deleted.",
        "/account",
    ))
}

fn validate_post_form(form: &PostForm) -> Result<ValidPost, String> {
    let title = domain::sanitize_text(&form.title);
    let subtitle = domain::sanitize_text(&form.subtitle);
    let img_url = form.img_url.trim().to_string();
    let body = form.body.trim().to_string();

    if title.is_empty() || subtitle.is_empty() || img_url.is_empty() || body.is_empty() {
        return Err("All fields are required.".into());
    }
    if !domain::validate_image_url(&img_url) {
        return Err("The image reference must be an http(s) URL.".into());
    }

    Ok(ValidPost {
        title,
        subtitle,
        img_url,
        body,
    })
}
