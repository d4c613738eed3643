use askama::Template;
use axum::extract::{Form, Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;

use crate::blog::domain;
use crate::blog::repository::{BlogRepository, StoreError};
use crate::db::models::{Comment, User};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::flash::{self, flash_redirect, Flash, FlashMessage};
use crate::ratelimit::{self, RateLimiter, RouteQuota};
use crate::routes::pages::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/edit_comment.html")]
struct EditCommentTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
    comment: Comment,
}

#[derive(Deserialize)]
pub struct CommentForm {
    pub comment: String,
}

pub fn router(limiter: Arc<RateLimiter>) -> Router<AppState> {
    let edit = Router::new()
        .route("/edit-comment/{id}", get(edit_comment_page).post(update_comment))
        .route_layer(axum::middleware::from_fn_with_state(
            RouteQuota::per_hour(limiter, "edit-comment", 15),
            ratelimit::enforce,
        ));

    Router::new()
        .route("/post/{id}/comment", post(create_comment))
        .route("/delete-comment/{id}", post(delete_comment))
        .merge(edit)
}

async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    maybe_user: MaybeUser,
    Form(form): Form<CommentForm>,
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

    let text = form.comment.trim().to_string();
    let post_path = format!("/post/{}", post.id);
    if text.is_empty() {
        return Ok(flash_redirect("error", "Comment text is required.", &post_path));
    }

    if state
        .repo
        .comment_by_author_and_post(user.id, post.id)
        .await?
        .is_some()
    {
        return Ok(flash_redirect(
            "error",
            "You have already commented on this post.",
            "/account",
        ));
    }

    match state.repo.insert_comment(user.id, post.id, &text).await {
        Ok(_) => Ok(flash_redirect(
            "success",
            "Comment submitted successfully.",
            &post_path,
        )),
        // Two submissions can pass the pre-check together; the constraint
        // decides and the second one lands here.
        Err(StoreError::ConstraintViolation(_)) => Ok(flash_redirect(
            "error",
            "You have already commented on this post.",
            "/account",
        )),
        Err(e) => Err(e.into()),
    }
}

async fn edit_comment_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
    flash: Flash,
) -> AppResult<Response> {
    let Some(comment) = state.repo.comment_by_id(id).await? else {
        return Ok(flash_redirect("error", "Comment record not found.", "/account"));
    };
    if !domain::can_modify_comment(&user, &comment) {
        return Ok(flash_redirect(
            "error",
            "You are not allowed to edit this comment!",
            "/account",
        ));
    }

    let template = EditCommentTemplate {
        user: Some(user),
        flash: flash.0.clone(),
        comment,
    };
    Ok(flash::render(&flash, Html(template)))
}

async fn update_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let Some(comment) = state.repo.comment_by_id(id).await? else {
        return Ok(flash_redirect("error", "Comment record not found.", "/account"));
    };
    if !domain::can_modify_comment(&user, &comment) {
        return Ok(flash_redirect(
            "error",
            "You are not allowed to edit this comment!",
            "/account",
        ));
    }

    let text = form.comment.trim().to_string();
    if text.is_empty() {
        let edit_path = format!("/edit-comment/{}", id);
        return Ok(flash_redirect("error", "Comment text is required.", &edit_path));
    }

    state.repo.update_comment(id, &text).await?;
    Ok(flash_redirect(
        "success",
        "Your comment has been modified.",
        "/account",
    ))
}

async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let Some(comment) = state.repo.comment_by_id(id).await? else {
        return Ok(flash_redirect("error", "Comment record not found.", "/account"));
    };
    if !domain::can_modify_comment(&user, &comment) {
        return Ok(flash_redirect(
            "error",
            "You are not allowed to delete this comment!",
            "/account",
        ));
    }

    state.repo.delete_comment(id).await?;
    Ok(flash_redirect(
        "success",
        "Your comment has been deleted.",
        "/account",
    ))
}
