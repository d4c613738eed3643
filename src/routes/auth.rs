use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::auth::handlers;
use crate::ratelimit::{self, RateLimiter, RouteQuota};
use crate::state::AppState;

pub fn router(limiter: Arc<RateLimiter>) -> Router<AppState> {
    let register = Router::new()
        .route("/register", get(handlers::register_page).post(handlers::register))
        .route_layer(axum::middleware::from_fn_with_state(
            RouteQuota::per_hour(limiter.clone(), "register", 5),
            ratelimit::enforce,
        ));
    let login = Router::new()
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route_layer(axum::middleware::from_fn_with_state(
            RouteQuota::per_hour(limiter, "login", 15),
            ratelimit::enforce,
        ));

    Router::new()
        .merge(register)
        .merge(login)
        .route("/logout", post(handlers::logout))
}
