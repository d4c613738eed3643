use askama::Template;
use axum::extract::{Form, Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;

use crate::blog::domain;
use crate::blog::repository::{BlogRepository, StoreError};
use crate::db::models::{Rating, User};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::flash::{self, flash_redirect, Flash, FlashMessage};
use crate::ratelimit::{self, RateLimiter, RouteQuota};
use crate::routes::pages::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/edit_rating.html")]
struct EditRatingTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
    rating: Rating,
}

#[derive(Deserialize)]
pub struct RatingForm {
    pub rating: f64,
}

pub fn router(limiter: Arc<RateLimiter>) -> Router<AppState> {
    let edit = Router::new()
        .route("/edit-rating/{id}", get(edit_rating_page).post(update_rating))
        .route_layer(axum::middleware::from_fn_with_state(
            RouteQuota::per_hour(limiter, "edit-rating", 15),
            ratelimit::enforce,
        ));

    Router::new()
        .route("/post/{id}/rating", post(create_rating))
        .route("/delete-rating/{id}", post(delete_rating))
        .merge(edit)
}

async fn create_rating(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    maybe_user: MaybeUser,
    Form(form): Form<RatingForm>,
) -> AppResult<Response> {
    let Some(user) = maybe_user.0 else {
        return Ok(flash_redirect(
            "error",
            "You need to log in to comment or rate.",
            "/login",
        ));
    };

    let Some(post) = state.repo.post_by_id(post_id).await? else {
        return Ok(flash_redirect("error", "Post record not found.", "/error"));
    };

    let post_path = format!("/post/{}", post.id);

    // Out-of-range values never reach the gateway
    if let Err(msg) = domain::validate_rating(form.rating) {
        return Ok(flash_redirect("error", &msg, &post_path));
    }

    if state
        .repo
        .rating_by_author_and_post(user.id, post.id)
        .await?
        .is_some()
    {
        return Ok(flash_redirect(
            "error",
            "You have already rated this post.",
            "/account",
        ));
    }

    match state.repo.insert_rating(user.id, post.id, form.rating).await {
        Ok(_) => Ok(flash_redirect(
            "success",
            "Rating submitted successfully.",
            &post_path,
        )),
        Err(StoreError::ConstraintViolation(_)) => Ok(flash_redirect(
            "error",
            "You have already rated this post.",
            "/account",
        )),
        Err(e) => Err(e.into()),
    }
}

async fn edit_rating_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
    flash: Flash,
) -> AppResult<Response> {
    let Some(rating) = state.repo.rating_by_id(id).await? else {
        return Ok(flash_redirect("error", "Rating record not found.", "/account"));
    };
    if !domain::can_modify_rating(&user, &rating) {
        return Ok(flash_redirect(
            "error",
            "You are not allowed to edit this rating!",
            "/account",
        ));
    }

    let template = EditRatingTemplate {
        user: Some(user),
        flash: flash.0.clone(),
        rating,
    };
    Ok(flash::render(&flash, Html(template)))
}

async fn update_rating(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<RatingForm>,
) -> AppResult<Response> {
    let Some(rating) = state.repo.rating_by_id(id).await? else {
        return Ok(flash_redirect("error", "Rating record not found.", "/account"));
    };
    if !domain::can_modify_rating(&user, &rating) {
        return Ok(flash_redirect(
            "error",
            "You are not allowed to edit this rating!",
            "/account",
        ));
    }

    if let Err(msg) = domain::validate_rating(form.rating) {
        let edit_path = format!("/edit-rating/{}", id);
        return Ok(flash_redirect("error", &msg, &edit_path));
    }

    state.repo.update_rating(id, form.rating).await?;
    Ok(flash_redirect(
        "success",
        "Your new rating has been submitted.",
        "/account",
    ))
}

async fn delete_rating(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let Some(rating) = state.repo.rating_by_id(id).await? else {
        return Ok(flash_redirect("error", "Rating record not found.", "/account"));
    };
    if !domain::can_modify_rating(&user, &rating) {
        return Ok(flash_redirect(
            "error",
            "You are not allowed to delete this rating!",
            "/account",
        ));
    }

    state.repo.delete_rating(id).await?;
    Ok(flash_redirect(
        "success",
        "Your rating has been deleted.",
        "/account",
    ))
}
