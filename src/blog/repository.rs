//! Persistence gateway. The only component allowed to issue transactional
//! operations against the store; callers see `StoreError`, never a rusqlite
//! or pool error.

use async_trait::async_trait;
use rusqlite::params;
use std::sync::Arc;
use thiserror::Error;

use crate::blog::domain::PermissionChange;
use crate::db::models::{Comment, Post, Rating, Role, User};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule was violated (duplicate email, title, or
    /// (author, post) pair). Callers turn this into a specific message.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Any other store-level failure; the message is for the log.
    #[error("{0}")]
    Failure(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return StoreError::ConstraintViolation(err.to_string());
            }
        }
        StoreError::Failure(err.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Failure(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Field bundle for creating a post.
pub struct NewPost<'a> {
    pub author_id: i64,
    pub title: &'a str,
    pub subtitle: &'a str,
    pub body: &'a str,
    pub img_url: &'a str,
    pub date: &'a str,
}

/// Field bundle for editing a post; the author and date never change.
pub struct PostChanges<'a> {
    pub title: &'a str,
    pub subtitle: &'a str,
    pub body: &'a str,
    pub img_url: &'a str,
}

/// All reads and writes for the four entity tables. Lookups by id return
/// `Ok(None)` for missing rows so callers can branch without error handling.
#[async_trait]
pub trait BlogRepository: Send + Sync {
    // users
    async fn insert_user(&self, email: &str, password_hash: &str, name: &str)
        -> StoreResult<User>;
    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn users_with_pending_request(&self) -> StoreResult<Vec<User>>;
    async fn users_with_posting_rights(&self) -> StoreResult<Vec<User>>;
    async fn mark_posting_requested(&self, user_id: i64) -> StoreResult<()>;
    async fn apply_permission_change(
        &self,
        user_id: i64,
        change: PermissionChange,
    ) -> StoreResult<()>;

    // posts
    async fn list_posts(&self) -> StoreResult<Vec<Post>>;
    async fn post_by_id(&self, id: i64) -> StoreResult<Option<Post>>;
    async fn posts_by_author(&self, author_id: i64) -> StoreResult<Vec<Post>>;
    async fn insert_post(&self, new: NewPost<'_>) -> StoreResult<Post>;
    async fn update_post(&self, id: i64, changes: PostChanges<'_>) -> StoreResult<()>;
    /// Removes the post and everything hanging off it in one transaction.
    async fn delete_post(&self, id: i64) -> StoreResult<()>;

    // comments
    async fn comment_by_id(&self, id: i64) -> StoreResult<Option<Comment>>;
    async fn comment_by_author_and_post(
        &self,
        author_id: i64,
        post_id: i64,
    ) -> StoreResult<Option<Comment>>;
    async fn comments_for_post(&self, post_id: i64) -> StoreResult<Vec<Comment>>;
    async fn comments_by_author(&self, author_id: i64) -> StoreResult<Vec<Comment>>;
    async fn insert_comment(&self, author_id: i64, post_id: i64, text: &str)
        -> StoreResult<Comment>;
    async fn update_comment(&self, id: i64, text: &str) -> StoreResult<()>;
    async fn delete_comment(&self, id: i64) -> StoreResult<()>;

    // ratings
    async fn rating_by_id(&self, id: i64) -> StoreResult<Option<Rating>>;
    async fn rating_by_author_and_post(
        &self,
        author_id: i64,
        post_id: i64,
    ) -> StoreResult<Option<Rating>>;
    async fn ratings_for_post(&self, post_id: i64) -> StoreResult<Vec<Rating>>;
    async fn ratings_by_author(&self, author_id: i64) -> StoreResult<Vec<Rating>>;
    async fn insert_rating(&self, author_id: i64, post_id: i64, value: f64)
        -> StoreResult<Rating>;
    async fn update_rating(&self, id: i64, value: f64) -> StoreResult<()>;
    async fn delete_rating(&self, id: i64) -> StoreResult<()>;
}

pub type DynBlogRepository = Arc<dyn BlogRepository>;

const USER_COLUMNS: &str =
    "id, email, password_hash, name, role, can_post, has_pending_request, created_at";

const POST_SELECT: &str = "SELECT p.id, p.author_id, p.title, p.subtitle, p.body, p.img_url, \
     p.date, u.name FROM posts p JOIN users u ON u.id = p.author_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, c.text, u.name, p.title \
     FROM comments c JOIN users u ON u.id = c.author_id JOIN posts p ON p.id = c.post_id";

const RATING_SELECT: &str = "SELECT r.id, r.post_id, r.author_id, r.value, p.title \
     FROM ratings r JOIN posts p ON p.id = r.post_id";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        role: Role::from_db(&role),
        can_post: row.get(5)?,
        has_pending_request: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        author_id: row.get(1)?,
        title: row.get(2)?,
        subtitle: row.get(3)?,
        body: row.get(4)?,
        img_url: row.get(5)?,
        date: row.get(6)?,
        author_name: row.get(7)?,
    })
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        text: row.get(3)?,
        author_name: row.get(4)?,
        post_title: row.get(5)?,
    })
}

fn rating_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Rating> {
    Ok(Rating {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        value: row.get(3)?,
        post_title: row.get(4)?,
    })
}

/// SQLite implementation over the r2d2 pool.
pub struct SqliteBlogRepository {
    pool: DbPool,
}

impl SqliteBlogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> StoreResult<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn fetch_optional<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> StoreResult<Option<T>> {
        let conn = self.conn()?;
        match conn.query_row(sql, params, map) {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch_all<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> StoreResult<Vec<T>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params, map)
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        Ok(rows)
    }
}

#[async_trait]
impl BlogRepository for SqliteBlogRepository {
    async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> StoreResult<User> {
        let conn = self.conn()?;
        // The first account to register becomes the site admin; the subquery
        // decides inside the INSERT, so two racing registrations cannot both
        // claim the role.
        conn.execute(
            "INSERT INTO users (email, password_hash, name, role)
             VALUES (?1, ?2, ?3,
                     CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'member' ELSE 'admin' END)",
            params![email, password_hash, name],
        )?;
        let id = conn.last_insert_rowid();
        let user = conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            user_from_row,
        )?;
        Ok(user)
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        self.fetch_optional(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            user_from_row,
        )
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.fetch_optional(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            params![email],
            user_from_row,
        )
    }

    async fn users_with_pending_request(&self) -> StoreResult<Vec<User>> {
        self.fetch_all(
            &format!(
                "SELECT {} FROM users WHERE has_pending_request = 1 ORDER BY id",
                USER_COLUMNS
            ),
            [],
            user_from_row,
        )
    }

    async fn users_with_posting_rights(&self) -> StoreResult<Vec<User>> {
        self.fetch_all(
            &format!(
                "SELECT {} FROM users WHERE can_post = 1 ORDER BY id",
                USER_COLUMNS
            ),
            [],
            user_from_row,
        )
    }

    async fn mark_posting_requested(&self, user_id: i64) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET has_pending_request = 1 WHERE id = ?1",
            params![user_id],
        )?;
        Ok(())
    }

    async fn apply_permission_change(
        &self,
        user_id: i64,
        change: PermissionChange,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET can_post = ?1, has_pending_request = ?2 WHERE id = ?3",
            params![change.can_post, change.has_pending_request, user_id],
        )?;
        Ok(())
    }

    async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        self.fetch_all(
            &format!("{} ORDER BY p.id DESC", POST_SELECT),
            [],
            post_from_row,
        )
    }

    async fn post_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        self.fetch_optional(
            &format!("{} WHERE p.id = ?1", POST_SELECT),
            params![id],
            post_from_row,
        )
    }

    async fn posts_by_author(&self, author_id: i64) -> StoreResult<Vec<Post>> {
        self.fetch_all(
            &format!("{} WHERE p.author_id = ?1 ORDER BY p.id DESC", POST_SELECT),
            params![author_id],
            post_from_row,
        )
    }

    async fn insert_post(&self, new: NewPost<'_>) -> StoreResult<Post> {
        let id = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO posts (author_id, title, subtitle, body, img_url, date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.author_id,
                    new.title,
                    new.subtitle,
                    new.body,
                    new.img_url,
                    new.date
                ],
            )?;
            conn.last_insert_rowid()
        };
        match self.post_by_id(id).await? {
            Some(post) => Ok(post),
            None => Err(StoreError::Failure(format!(
                "post {} vanished after insert",
                id
            ))),
        }
    }

    async fn update_post(&self, id: i64, changes: PostChanges<'_>) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE posts SET title = ?1, subtitle = ?2, body = ?3, img_url = ?4 WHERE id = ?5",
            params![
                changes.title,
                changes.subtitle,
                changes.body,
                changes.img_url,
                id
            ],
        )?;
        Ok(())
    }

    async fn delete_post(&self, id: i64) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: StoreResult<()> = (|| {
            conn.execute("DELETE FROM comments WHERE post_id = ?1", params![id])?;
            conn.execute("DELETE FROM ratings WHERE post_id = ?1", params![id])?;
            conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                Ok(())
            }
            Err(e) => {
                conn.execute("ROLLBACK", [])?;
                Err(e)
            }
        }
    }

    async fn comment_by_id(&self, id: i64) -> StoreResult<Option<Comment>> {
        self.fetch_optional(
            &format!("{} WHERE c.id = ?1", COMMENT_SELECT),
            params![id],
            comment_from_row,
        )
    }

    async fn comment_by_author_and_post(
        &self,
        author_id: i64,
        post_id: i64,
    ) -> StoreResult<Option<Comment>> {
        self.fetch_optional(
            &format!(
                "{} WHERE c.author_id = ?1 AND c.post_id = ?2",
                COMMENT_SELECT
            ),
            params![author_id, post_id],
            comment_from_row,
        )
    }

    async fn comments_for_post(&self, post_id: i64) -> StoreResult<Vec<Comment>> {
        self.fetch_all(
            &format!("{} WHERE c.post_id = ?1 ORDER BY c.id", COMMENT_SELECT),
            params![post_id],
            comment_from_row,
        )
    }

    async fn comments_by_author(&self, author_id: i64) -> StoreResult<Vec<Comment>> {
        self.fetch_all(
            &format!("{} WHERE c.author_id = ?1 ORDER BY c.id", COMMENT_SELECT),
            params![author_id],
            comment_from_row,
        )
    }

    async fn insert_comment(
        &self,
        author_id: i64,
        post_id: i64,
        text: &str,
    ) -> StoreResult<Comment> {
        let id = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO comments (post_id, author_id, text) VALUES (?1, ?2, ?3)",
                params![post_id, author_id, text],
            )?;
            conn.last_insert_rowid()
        };
        match self.comment_by_id(id).await? {
            Some(comment) => Ok(comment),
            None => Err(StoreError::Failure(format!(
                "comment {} vanished after insert",
                id
            ))),
        }
    }

    async fn update_comment(&self, id: i64, text: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE comments SET text = ?1 WHERE id = ?2",
            params![text, id],
        )?;
        Ok(())
    }

    async fn delete_comment(&self, id: i64) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        Ok(())
    }

    async fn rating_by_id(&self, id: i64) -> StoreResult<Option<Rating>> {
        self.fetch_optional(
            &format!("{} WHERE r.id = ?1", RATING_SELECT),
            params![id],
            rating_from_row,
        )
    }

    async fn rating_by_author_and_post(
        &self,
        author_id: i64,
        post_id: i64,
    ) -> StoreResult<Option<Rating>> {
        self.fetch_optional(
            &format!("{} WHERE r.author_id = ?1 AND r.post_id = ?2", RATING_SELECT),
            params![author_id, post_id],
            rating_from_row,
        )
    }

    async fn ratings_for_post(&self, post_id: i64) -> StoreResult<Vec<Rating>> {
        self.fetch_all(
            &format!("{} WHERE r.post_id = ?1 ORDER BY r.id", RATING_SELECT),
            params![post_id],
            rating_from_row,
        )
    }

    async fn ratings_by_author(&self, author_id: i64) -> StoreResult<Vec<Rating>> {
        self.fetch_all(
            &format!("{} WHERE r.author_id = ?1 ORDER BY r.id", RATING_SELECT),
            params![author_id],
            rating_from_row,
        )
    }

    async fn insert_rating(
        &self,
        author_id: i64,
        post_id: i64,
        value: f64,
    ) -> StoreResult<Rating> {
        let id = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO ratings (post_id, author_id, value) VALUES (?1, ?2, ?3)",
                params![post_id, author_id, value],
            )?;
            conn.last_insert_rowid()
        };
        match self.rating_by_id(id).await? {
            Some(rating) => Ok(rating),
            None => Err(StoreError::Failure(format!(
                "rating {} vanished after insert",
                id
            ))),
        }
    }

    async fn update_rating(&self, id: i64, value: f64) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE ratings SET value = ?1 WHERE id = ?2",
            params![value, id],
        )?;
        Ok(())
    }

    async fn delete_rating(&self, id: i64) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM ratings WHERE id = ?1", params![id])?;
        Ok(())
    }
}
