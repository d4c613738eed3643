use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::blog::repository::DynBlogRepository;
use crate::captcha::CaptchaVerifier;
use crate::config::Config;
use crate::notify::Notifier;
use crate::ratelimit::RateLimiter;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Everything a handler needs, constructed once in `main` and cloned per
/// request. No ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub repo: DynBlogRepository,
    pub config: Config,
    pub notifier: Notifier,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub limiter: Arc<RateLimiter>,
}
