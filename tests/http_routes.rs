//! Router-level tests: requests in, redirects and rows out.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use quill::blog::domain::{apply_decision, Decision};
use quill::blog::repository::{BlogRepository, NewPost, SqliteBlogRepository};
use quill::captcha::AllowAll;
use quill::config::Config;
use quill::db;
use quill::notify::{LogMailer, LogTexter, Notifier};
use quill::ratelimit::RateLimiter;
use quill::state::AppState;

fn test_app() -> (Router, AppState, TempDir) {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("test.db");
    let pool = db::create_pool(&db_path).unwrap();
    db::run_migrations(&pool).unwrap();

    let mut config = Config::default();
    config.database.path = Some(db_path);

    let state = AppState {
        db: pool.clone(),
        repo: Arc::new(SqliteBlogRepository::new(pool)),
        config,
        notifier: Notifier::new(Arc::new(LogMailer), Arc::new(LogTexter)),
        captcha: Arc::new(AllowAll),
        limiter: Arc::new(RateLimiter::new()),
    };
    let app = quill::build_router(state.clone());
    (app, state, tmp)
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_form(app: &Router, uri: &str, cookie: Option<&str>, body: &str) -> Response {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect location")
        .to_str()
        .unwrap()
}

fn session_cookie(response: &Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("quill_session="))
        .map(|v| v.split(';').next().unwrap().to_string())
        .expect("session cookie")
}

/// Register through the real handler; returns the session cookie.
async fn register(app: &Router, email: &str, name: &str) -> String {
    let body = format!("email={}&password=Passw0rd%21&name={}", email, name);
    let response = post_form(app, "/register", None, &body).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER, "register failed");
    session_cookie(&response)
}

#[tokio::test]
async fn index_is_world_readable() {
    let (app, _state, _tmp) = test_app();
    let response = get(&app, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_logs_in_and_account_page_loads() {
    let (app, _state, _tmp) = test_app();
    let cookie = register(&app, "a@x.com", "A").await;

    let response = get(&app, "/account", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn anonymous_account_access_bounces_to_login() {
    let (app, _state, _tmp) = test_app();
    let response = get(&app, "/account", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn duplicate_registration_leaves_one_row() {
    let (app, state, _tmp) = test_app();
    register(&app, "a@x.com", "A").await;

    let response = post_form(
        &app,
        "/register",
        None,
        "email=a@x.com&password=Passw0rd%21&name=A+again",
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let user = state.repo.user_by_email("a@x.com").await.unwrap().unwrap();
    assert_eq!(user.name, "A");
}

#[tokio::test]
async fn login_rejects_unknown_email_and_wrong_password() {
    let (app, _state, _tmp) = test_app();
    register(&app, "a@x.com", "A").await;

    let response = post_form(&app, "/login", None, "email=who@x.com&password=Passw0rd%21").await;
    assert_eq!(location(&response), "/login");

    let response = post_form(&app, "/login", None, "email=a@x.com&password=Wrong0ne%21").await;
    assert_eq!(location(&response), "/login");

    let response = post_form(&app, "/login", None, "email=a@x.com&password=Passw0rd%21").await;
    assert_eq!(location(&response), "/");
    session_cookie(&response);
}

#[tokio::test]
async fn weak_passwords_are_rejected_at_registration() {
    let (app, state, _tmp) = test_app();
    let response = post_form(
        &app,
        "/register",
        None,
        "email=a@x.com&password=alllower1&name=A",
    )
    .await;
    assert_eq!(location(&response), "/register");
    assert!(state.repo.user_by_email("a@x.com").await.unwrap().is_none());
}

#[tokio::test]
async fn users_without_permission_cannot_publish() {
    let (app, state, _tmp) = test_app();
    let cookie = register(&app, "reader@x.com", "Reader").await;

    let response = post_form(
        &app,
        "/new-post",
        Some(&cookie),
        "title=Hello&subtitle=Sub&img_url=https%3A%2F%2Fexample.com%2Fx.png&body=Text",
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/error");

    // No row was created
    assert!(state.repo.list_posts().await.unwrap().is_empty());
}

#[tokio::test]
async fn granted_users_publish_and_duplicate_titles_conflict() {
    let (app, state, _tmp) = test_app();
    let cookie = register(&app, "author@x.com", "Author").await;
    let author = state
        .repo
        .user_by_email("author@x.com")
        .await
        .unwrap()
        .unwrap();
    state
        .repo
        .apply_permission_change(author.id, apply_decision(Decision::Approve))
        .await
        .unwrap();

    let form = "title=Hello&subtitle=Sub&img_url=https%3A%2F%2Fexample.com%2Fx.png&body=Text";
    let response = post_form(&app, "/new-post", Some(&cookie), form).await;
    assert_eq!(location(&response), "/");
    assert_eq!(state.repo.list_posts().await.unwrap().len(), 1);

    // Same title again: a specific conflict, back to the form
    let response = post_form(&app, "/new-post", Some(&cookie), form).await;
    assert_eq!(location(&response), "/new-post");
    assert_eq!(state.repo.list_posts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn only_the_author_or_admin_may_edit_or_delete_a_post() {
    let (app, state, _tmp) = test_app();
    // First registration is the admin
    let admin_cookie = register(&app, "admin@x.com", "Admin").await;
    let author_cookie = register(&app, "author@x.com", "Author").await;
    let intruder_cookie = register(&app, "intruder@x.com", "Intruder").await;

    let author = state
        .repo
        .user_by_email("author@x.com")
        .await
        .unwrap()
        .unwrap();
    state
        .repo
        .apply_permission_change(author.id, apply_decision(Decision::Approve))
        .await
        .unwrap();
    let post = state
        .repo
        .insert_post(NewPost {
            author_id: author.id,
            title: "Hello",
            subtitle: "Sub",
            body: "Text",
            img_url: "https://example.com/x.png",
            date: "August 07, 2026",
        })
        .await
        .unwrap();

    // A third party is turned away and nothing changes
    let edit_form =
        "title=Defaced&subtitle=Sub&img_url=https%3A%2F%2Fexample.com%2Fx.png&body=Text";
    let response = post_form(
        &app,
        &format!("/edit-post/{}", post.id),
        Some(&intruder_cookie),
        edit_form,
    )
    .await;
    assert_eq!(location(&response), "/account");
    let unchanged = state.repo.post_by_id(post.id).await.unwrap().unwrap();
    assert_eq!(unchanged.title, "Hello");

    let response = post_form(
        &app,
        &format!("/delete-post/{}", post.id),
        Some(&intruder_cookie),
        "",
    )
    .await;
    assert_eq!(location(&response), "/account");
    assert!(state.repo.post_by_id(post.id).await.unwrap().is_some());

    // The author edits their own post
    let response = post_form(
        &app,
        &format!("/edit-post/{}", post.id),
        Some(&author_cookie),
        "title=Hello+again&subtitle=Sub&img_url=https%3A%2F%2Fexample.com%2Fx.png&body=Text",
    )
    .await;
    assert_eq!(location(&response), &format!("/post/{}", post.id));
    let edited = state.repo.post_by_id(post.id).await.unwrap().unwrap();
    assert_eq!(edited.title, "Hello again");

    // The admin may delete it
    let response = post_form(
        &app,
        &format!("/delete-post/{}", post.id),
        Some(&admin_cookie),
        "",
    )
    .await;
    assert_eq!(location(&response), "/account");
    assert!(state.repo.post_by_id(post.id).await.unwrap().is_none());
}

#[tokio::test]
async fn second_comment_on_a_post_is_a_conflict() {
    let (app, state, _tmp) = test_app();
    let _admin = register(&app, "admin@x.com", "Admin").await;
    let reader_cookie = register(&app, "reader@x.com", "Reader").await;

    let admin = state.repo.user_by_email("admin@x.com").await.unwrap().unwrap();
    state
        .repo
        .apply_permission_change(admin.id, apply_decision(Decision::Approve))
        .await
        .unwrap();
    let post = state
        .repo
        .insert_post(NewPost {
            author_id: admin.id,
            title: "Hello",
            subtitle: "Sub",
            body: "Text",
            img_url: "https://example.com/x.png",
            date: "August 07, 2026",
        })
        .await
        .unwrap();

    let uri = format!("/post/{}/comment", post.id);
    let response = post_form(&app, &uri, Some(&reader_cookie), "comment=Nice+post").await;
    assert_eq!(location(&response), &format!("/post/{}", post.id));

    let response = post_form(&app, &uri, Some(&reader_cookie), "comment=Nice+again").await;
    assert_eq!(location(&response), "/account");

    assert_eq!(state.repo.comments_for_post(post.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn out_of_range_ratings_never_reach_the_store() {
    let (app, state, _tmp) = test_app();
    let _admin = register(&app, "admin@x.com", "Admin").await;
    let reader_cookie = register(&app, "reader@x.com", "Reader").await;

    let admin = state.repo.user_by_email("admin@x.com").await.unwrap().unwrap();
    state
        .repo
        .apply_permission_change(admin.id, apply_decision(Decision::Approve))
        .await
        .unwrap();
    let post = state
        .repo
        .insert_post(NewPost {
            author_id: admin.id,
            title: "Hello",
            subtitle: "Sub",
            body: "Text",
            img_url: "https://example.com/x.png",
            date: "August 07, 2026",
        })
        .await
        .unwrap();

    let uri = format!("/post/{}/rating", post.id);
    let response = post_form(&app, &uri, Some(&reader_cookie), "rating=10.0001").await;
    assert_eq!(location(&response), &format!("/post/{}", post.id));
    assert!(state.repo.ratings_for_post(post.id).await.unwrap().is_empty());

    let response = post_form(&app, &uri, Some(&reader_cookie), "rating=10").await;
    assert_eq!(location(&response), &format!("/post/{}", post.id));
    let ratings = state.repo.ratings_for_post(post.id).await.unwrap();
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].value, 10.0);
}

#[tokio::test]
async fn approval_flow_flips_flags_even_when_email_fails() {
    let (app, state, _tmp) = test_app();
    let admin_cookie = register(&app, "admin@x.com", "Admin").await;
    let c_cookie = register(&app, "c@x.com", "C").await;

    // C submits a posting request (bot check passes in tests)
    let response = post_form(
        &app,
        "/request-posting",
        Some(&c_cookie),
        "reason=I+have+things+to+say",
    )
    .await;
    assert_eq!(location(&response), "/request-posting");
    let c = state.repo.user_by_email("c@x.com").await.unwrap().unwrap();
    assert!(c.has_pending_request);

    // Only the admin can see the review page
    let response = get(&app, "/permission", Some(&c_cookie)).await;
    assert_eq!(location(&response), "/error");
    let response = get(&app, "/permission", Some(&admin_cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Approval commits the flag change; the log-only mailer fails, so only
    // the flash differs
    let response = post_form(
        &app,
        &format!("/process-posting/{}/approve", c.id),
        Some(&admin_cookie),
        "",
    )
    .await;
    assert_eq!(location(&response), "/permission");

    let c = state.repo.user_by_email("c@x.com").await.unwrap().unwrap();
    assert!(c.can_post);
    assert!(!c.has_pending_request);
}

#[tokio::test]
async fn rate_limit_kicks_in_on_repeated_registration() {
    let (app, _state, _tmp) = test_app();

    // Quota is 5 per hour per client; the sixth attempt is refused
    for i in 0..5 {
        let body = format!("email=u{}@x.com&password=Passw0rd%21&name=U{}", i, i);
        let response = post_form(&app, "/register", None, &body).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }
    let response = post_form(
        &app,
        "/register",
        None,
        "email=u6@x.com&password=Passw0rd%21&name=U6",
    )
    .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
