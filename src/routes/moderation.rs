//! The posting-permission workflow: members ask, the admin decides, the
//! affected user is notified best-effort.

use askama::Template;
use axum::extract::{Form, Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;

use crate::blog::domain::{self, apply_decision, Decision};
use crate::blog::repository::BlogRepository;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::flash::{self, flash_redirect, Flash, FlashMessage};
use crate::ratelimit::{self, RateLimiter, RouteQuota};
use crate::routes::pages::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/request.html")]
struct RequestTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
    site_key: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/permission.html")]
struct PermissionTemplate {
    user: Option<User>,
    flash: Option<FlashMessage>,
    pending: Vec<User>,
    authors: Vec<User>,
}

#[derive(Deserialize)]
pub struct RequestForm {
    pub reason: String,
    #[serde(rename = "g-recaptcha-response", default)]
    pub captcha_response: String,
}

pub fn router(limiter: Arc<RateLimiter>) -> Router<AppState> {
    let request = Router::new()
        .route("/request-posting", get(request_page).post(submit_request))
        .route_layer(axum::middleware::from_fn_with_state(
            RouteQuota::per_hour(limiter, "request-posting", 15),
            ratelimit::enforce,
        ));

    Router::new()
        .route("/permission", get(permission))
        .route("/process-posting/{user_id}/{decision}", post(process_posting))
        .merge(request)
}

async fn request_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    flash: Flash,
) -> Response {
    let template = RequestTemplate {
        user: Some(user),
        flash: flash.0.clone(),
        site_key: state.config.captcha_site_key(),
    };
    flash::render(&flash, Html(template))
}

async fn submit_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<RequestForm>,
) -> AppResult<Response> {
    if !state.captcha.verify(&form.captcha_response).await {
        return Ok(flash_redirect(
            "error",
            "Captcha verification failed.",
            "/request-posting",
        ));
    }

    if !domain::can_request_posting(&user) {
        return Ok(flash_redirect(
            "info",
            "You can already add posts.",
            "/account",
        ));
    }

    let reason = domain::sanitize_text(&form.reason);
    if reason.is_empty() {
        return Ok(flash_redirect(
            "error",
            "Please give a reason for your request.",
            "/request-posting",
        ));
    }

    // The flag is committed first; notification trouble must not undo it.
    state.repo.mark_posting_requested(user.id).await?;

    let subject = format!("New request to post on the blog from {}", user.name);
    let body = format!(
        "Name: {}\nEmail: {}\nRequest: {}",
        user.name, user.email, reason
    );
    if !state.notifier.email(&subject, &body, None).await {
        tracing::warn!("Could not email the admin about request from user {}", user.id);
    }
    let sms = state
        .notifier
        .text("You have a request to post pending.")
        .await;
    if !sms.success() {
        tracing::warn!("Could not text the admin about request from user {}", user.id);
    }

    Ok(flash_redirect(
        "success",
        "Your request has been submitted.",
        "/request-posting",
    ))
}

/// Review page: everyone waiting on a decision, plus the current authors.
async fn permission(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    flash: Flash,
) -> AppResult<Response> {
    if !domain::can_review_requests(&user) {
        return Err(AppError::Forbidden(
            "You are not allowed to review posting requests.".into(),
        ));
    }

    let pending = state.repo.users_with_pending_request().await?;
    let authors = state.repo.users_with_posting_rights().await?;

    let template = PermissionTemplate {
        user: Some(user),
        flash: flash.0.clone(),
        pending,
        authors,
    };
    Ok(flash::render(&flash, Html(template)))
}

async fn process_posting(
    State(state): State<AppState>,
    Path((user_id, decision)): Path<(i64, String)>,
    CurrentUser(admin): CurrentUser,
) -> AppResult<Response> {
    if !domain::can_review_requests(&admin) {
        return Err(AppError::Forbidden(
            "You are not allowed to review posting requests.".into(),
        ));
    }

    let Some(decision) = Decision::from_param(&decision) else {
        return Ok(flash_redirect("error", "Unknown decision.", "/permission"));
    };

    let Some(target) = state.repo.user_by_id(user_id).await? else {
        return Ok(flash_redirect(
            "error",
            "User record can not be retrieved.",
            "/permission",
        ));
    };

    state
        .repo
        .apply_permission_change(target.id, apply_decision(decision))
        .await?;
    tracing::info!(
        "Admin {} {} posting for user {}",
        admin.id,
        match decision {
            Decision::Approve => "granted",
            Decision::Deny => "denied",
        },
        target.id
    );

    // Best-effort notification; only the flash depends on the outcome.
    let (subject, body, granted_flash) = match decision {
        Decision::Approve => (
            "Your request to post has been accepted.",
            format!(
                "Hello {},\nYour request to add posts has been accepted.\nYou can start adding posts.\nSincerely,\nThe Blog.",
                target.name
            ),
            ("success", "User posting permission granted."),
        ),
        Decision::Deny => (
            "Your request to post has been denied.",
            format!(
                "Hello {},\nPlease note that your request to add posts has been denied at this time.\nSincerely,\nThe Blog.",
                target.name
            ),
            ("warning", "User posting request denied."),
        ),
    };

    let email_sent = state.notifier.email(subject, &body, Some(&target.email)).await;
    if email_sent {
        let (level, message) = granted_flash;
        Ok(flash_redirect(level, message, "/permission"))
    } else {
        Ok(flash_redirect(
            "error",
            "Error sending update to recipient.",
            "/permission",
        ))
    }
}
