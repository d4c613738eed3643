// Library exports so integration tests can assemble the app.

pub mod auth;
pub mod blog;
pub mod captcha;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod flash;
pub mod notify;
pub mod ratelimit;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Assemble the full route table over the given state.
pub fn build_router(state: AppState) -> Router {
    let limiter = state.limiter.clone();

    Router::new()
        .merge(routes::posts::router(limiter.clone()))
        .merge(routes::comments::router(limiter.clone()))
        .merge(routes::ratings::router(limiter.clone()))
        .merge(routes::moderation::router(limiter.clone()))
        .merge(routes::pages::router(limiter.clone()))
        .merge(routes::auth::router(limiter))
        .with_state(state)
}
