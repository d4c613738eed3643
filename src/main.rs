use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use quill::blog::repository::SqliteBlogRepository;
use quill::captcha::{AllowAll, CaptchaVerifier, RecaptchaVerifier};
use quill::config::{Cli, Config};
use quill::notify::Notifier;
use quill::ratelimit::RateLimiter;
use quill::state::AppState;
use quill::{build_router, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;

    // Wire up collaborators
    let notifier = Notifier::from_config(&config);
    let captcha: Arc<dyn CaptchaVerifier> = match &config.captcha {
        Some(keys) => Arc::new(RecaptchaVerifier::new(keys)),
        None => {
            tracing::warn!("No [captcha] config; bot checks will pass unconditionally");
            Arc::new(AllowAll)
        }
    };

    // Build app state
    let state = AppState {
        db: pool.clone(),
        repo: Arc::new(SqliteBlogRepository::new(pool)),
        config: config.clone(),
        notifier,
        captcha,
        limiter: Arc::new(RateLimiter::new()),
    };

    // Build router
    let app: Router = build_router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
