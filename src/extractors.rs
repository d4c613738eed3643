use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use rusqlite::params;

use crate::db::models::{Role, User};
use crate::error::AppError;
use crate::state::AppState;

/// Extractor for the currently authenticated user.
/// Redirects to the login page when no valid session is found.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?;

        let conn = state
            .db
            .get()
            .map_err(|e| AppError::Storage(e.to_string()))?;
        conn.query_row(
            "SELECT u.id, u.email, u.password_hash, u.name, u.role, u.can_post, \
                    u.has_pending_request, u.created_at \
             FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| {
                let role: String = row.get(4)?;
                Ok(CurrentUser(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    name: row.get(3)?,
                    role: Role::from_db(&role),
                    can_post: row.get(5)?,
                    has_pending_request: row.get(6)?,
                    created_at: row.get(7)?,
                }))
            },
        )
        .map_err(|_| AppError::Unauthorized)
    }
}

/// Optional user extractor — returns None instead of redirecting when not
/// authenticated.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user.0))),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}

/// The raw session token from the request cookies, if present.
pub fn extract_session_token(headers: &axum::http::HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name {
                Some(val.to_string())
            } else {
                None
            }
        })
}
