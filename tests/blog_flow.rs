//! End-to-end flows through the repository and domain layers, on a real
//! SQLite database in a temporary directory.

use quill::blog::domain::{self, apply_decision, Decision};
use quill::blog::repository::{
    BlogRepository, NewPost, SqliteBlogRepository, StoreError,
};
use quill::db;
use tempfile::TempDir;

fn create_test_repo() -> (SqliteBlogRepository, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let pool = db::create_pool(&db_path).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    (SqliteBlogRepository::new(pool), temp_dir)
}

#[tokio::test]
async fn comment_once_then_conflict_then_cascade_on_delete() {
    let (repo, _tmp) = create_test_repo();

    // Register user A and grant posting rights
    let a = repo.insert_user("a@x.com", "hash", "A").await.unwrap();
    repo.apply_permission_change(a.id, apply_decision(Decision::Approve))
        .await
        .unwrap();
    let a = repo.user_by_id(a.id).await.unwrap().unwrap();
    assert!(domain::can_create_post(&a));

    // A publishes "Hello"
    let post = repo
        .insert_post(NewPost {
            author_id: a.id,
            title: "Hello",
            subtitle: "First post",
            body: "Welcome to the blog.",
            img_url: "https://example.com/hello.png",
            date: "August 07, 2026",
        })
        .await
        .unwrap();

    // B comments once — succeeds
    let b = repo.insert_user("b@x.com", "hash", "B").await.unwrap();
    repo.insert_comment(b.id, post.id, "Nice post").await.unwrap();

    // B comments again — the pre-check the handlers run would refuse, and the
    // store constraint backs it up
    assert!(repo
        .comment_by_author_and_post(b.id, post.id)
        .await
        .unwrap()
        .is_some());
    let second = repo.insert_comment(b.id, post.id, "Nice again").await;
    assert!(matches!(second, Err(StoreError::ConstraintViolation(_))));
    assert_eq!(repo.comments_for_post(post.id).await.unwrap().len(), 1);

    // A deletes the post — B's comment row no longer exists
    repo.delete_post(post.id).await.unwrap();
    assert!(repo.post_by_id(post.id).await.unwrap().is_none());
    assert!(repo
        .comment_by_author_and_post(b.id, post.id)
        .await
        .unwrap()
        .is_none());
    assert!(repo.comments_by_author(b.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn permission_workflow_round_trip() {
    let (repo, _tmp) = create_test_repo();

    // First registration is the admin, the next one a plain member
    let admin = repo.insert_user("admin@x.com", "hash", "Admin").await.unwrap();
    let c = repo.insert_user("c@x.com", "hash", "C").await.unwrap();
    assert!(domain::can_review_requests(&admin));
    assert!(!domain::can_review_requests(&c));

    // C requests posting permission
    assert!(domain::can_request_posting(&c));
    repo.mark_posting_requested(c.id).await.unwrap();
    let pending = repo.users_with_pending_request().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, c.id);

    // Admin approves: can_post set, pending cleared
    repo.apply_permission_change(c.id, apply_decision(Decision::Approve))
        .await
        .unwrap();
    let c = repo.user_by_id(c.id).await.unwrap().unwrap();
    assert!(c.can_post);
    assert!(!c.has_pending_request);
    assert!(repo.users_with_pending_request().await.unwrap().is_empty());

    // Later the admin revokes; a denied user may request again
    repo.apply_permission_change(c.id, apply_decision(Decision::Deny))
        .await
        .unwrap();
    let c = repo.user_by_id(c.id).await.unwrap().unwrap();
    assert!(!c.can_post);
    assert!(!c.has_pending_request);
    assert!(domain::can_request_posting(&c));
    repo.mark_posting_requested(c.id).await.unwrap();
    assert_eq!(repo.users_with_pending_request().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rating_values_validated_before_the_gateway() {
    let (repo, _tmp) = create_test_repo();

    let a = repo.insert_user("a@x.com", "hash", "A").await.unwrap();
    repo.apply_permission_change(a.id, apply_decision(Decision::Approve))
        .await
        .unwrap();
    let post = repo
        .insert_post(NewPost {
            author_id: a.id,
            title: "Hello",
            subtitle: "First post",
            body: "Welcome.",
            img_url: "https://example.com/hello.png",
            date: "August 07, 2026",
        })
        .await
        .unwrap();
    let b = repo.insert_user("b@x.com", "hash", "B").await.unwrap();

    // Out-of-range values fail validation and never touch the store
    assert!(domain::validate_rating(10.0001).is_err());
    assert!(domain::validate_rating(-0.0001).is_err());
    assert!(repo.ratings_for_post(post.id).await.unwrap().is_empty());

    // Boundary values are accepted
    assert!(domain::validate_rating(0.0).is_ok());
    assert!(domain::validate_rating(10.0).is_ok());
    repo.insert_rating(b.id, post.id, 0.0).await.unwrap();
    repo.insert_rating(a.id, post.id, 10.0).await.unwrap();

    let ratings = repo.ratings_for_post(post.id).await.unwrap();
    assert_eq!(ratings.len(), 2);
    assert!((domain::mean_rating(&ratings) - 5.0).abs() < f64::EPSILON);
}
