//! Pure decision logic: authorization rules, input validation, and the
//! posting-permission workflow. Nothing in this module touches storage.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::models::{Comment, Post, Rating, Role, User};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$").expect("valid email regex")
});

const PASSWORD_SPECIALS: &str = "@$!%*?&";

// ---- Authorization rules ----
//
// Total functions over already-loaded rows and the acting user. Posts may be
// modified by their author or an admin; comments and ratings only ever by
// their author. The asymmetry is deliberate: moderation removes whole posts,
// it does not edit other people's words.

pub fn can_create_post(user: &User) -> bool {
    user.can_post
}

pub fn can_modify_post(user: &User, post: &Post) -> bool {
    user.role == Role::Admin || post.author_id == user.id
}

pub fn can_modify_comment(user: &User, comment: &Comment) -> bool {
    comment.author_id == user.id
}

pub fn can_modify_rating(user: &User, rating: &Rating) -> bool {
    rating.author_id == user.id
}

pub fn can_review_requests(user: &User) -> bool {
    user.role == Role::Admin
}

// ---- Posting-permission workflow ----
//
// The per-user state collapses into the two flags:
//   pending  = has_pending_request
//   approved = can_post (pending cleared)
//   denied / no request = neither flag
// A denied user may request again.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingStatus {
    NoRequest,
    Pending,
    Approved,
}

pub fn posting_status(user: &User) -> PostingStatus {
    if user.can_post {
        PostingStatus::Approved
    } else if user.has_pending_request {
        PostingStatus::Pending
    } else {
        PostingStatus::NoRequest
    }
}

/// An approved author has nothing left to request.
pub fn can_request_posting(user: &User) -> bool {
    !user.can_post
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
}

impl Decision {
    /// Accepts the words used in the review form as well as the legacy
    /// numeric flags ("1" approves, "0" denies).
    pub fn from_param(raw: &str) -> Option<Self> {
        match raw {
            "approve" | "1" => Some(Decision::Approve),
            "deny" | "0" => Some(Decision::Deny),
            _ => None,
        }
    }
}

/// Flag updates to persist for a reviewed user. Both outcomes clear the
/// pending flag; only approval grants posting rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionChange {
    pub can_post: bool,
    pub has_pending_request: bool,
}

pub fn apply_decision(decision: Decision) -> PermissionChange {
    PermissionChange {
        can_post: decision == Decision::Approve,
        has_pending_request: false,
    }
}

// ---- Input validation ----

/// Trim and escape markup metacharacters in visitor-supplied text.
pub fn sanitize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

pub fn validate_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Registration password policy: at least eight characters with one
/// uppercase, one lowercase, one digit, and one special character.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long.".into());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter.".into());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter.".into());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit.".into());
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return Err("Password must contain at least one special character.".into());
    }
    Ok(())
}

/// Image references must be absolute http(s) URLs.
pub fn validate_image_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Ratings are constrained to [0, 10]; both endpoints are valid.
pub fn validate_rating(value: f64) -> Result<(), String> {
    if !value.is_finite() || !(0.0..=10.0).contains(&value) {
        return Err("Rating must be between 0 and 10.".into());
    }
    Ok(())
}

/// Mean of the ratings on a post, computed at read time. 0 when unrated.
pub fn mean_rating(ratings: &[Rating]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    ratings.iter().map(|r| r.value).sum::<f64>() / ratings.len() as f64
}
