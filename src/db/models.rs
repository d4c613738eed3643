use serde::{Deserialize, Serialize};

/// Site-wide role. Admins review posting requests and may edit or delete any
/// post; everything else is per-owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }

    /// The role column carries a CHECK constraint, so anything unrecognized
    /// here would mean a hand-edited database; fall back to the weaker role.
    pub fn from_db(raw: &str) -> Self {
        if raw == "admin" {
            Role::Admin
        } else {
            Role::Member
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub can_post: bool,
    pub has_pending_request: bool,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub subtitle: String,
    pub body: String,
    pub img_url: String,
    /// Human-readable publication date, e.g. "August 07, 2026".
    pub date: String,
    /// Display name of the author, joined in by the repository.
    pub author_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub text: String,
    pub author_name: String,
    pub post_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub value: f64,
    pub post_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub token: String,
    pub expires_at: String,
    pub created_at: String,
}
