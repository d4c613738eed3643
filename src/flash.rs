//! One-shot flash messages carried in a short-lived cookie: a handler sets
//! the cookie alongside a redirect, and the next rendered page consumes it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use std::convert::Infallible;

const FLASH_COOKIE: &str = "quill_flash";
const CLEAR_COOKIE: &str = "quill_flash=; Path=/; Max-Age=0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashMessage {
    pub level: String,
    pub message: String,
}

/// Extractor for the pending flash message, if any.
#[derive(Debug, Clone, Default)]
pub struct Flash(pub Option<FlashMessage>);

impl<S> FromRequestParts<S> for Flash
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Flash(read_flash(parts)))
    }
}

/// Redirect to `to`, carrying a flash message for the next page.
pub fn flash_redirect(level: &str, message: &str, to: &str) -> Response {
    let encoded: String =
        url::form_urlencoded::byte_serialize(format!("{}:{}", level, message).as_bytes()).collect();
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age=60",
        FLASH_COOKIE, encoded
    );
    match HeaderValue::from_str(&cookie) {
        Ok(value) => ([(header::SET_COOKIE, value)], Redirect::to(to)).into_response(),
        Err(e) => {
            // byte_serialize output is plain ASCII, so this shouldn't happen
            tracing::error!("Dropping unencodable flash cookie: {}", e);
            Redirect::to(to).into_response()
        }
    }
}

/// Render a page response, clearing the flash cookie when one was consumed.
pub fn render(flash: &Flash, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    if flash.0.is_some() {
        response
            .headers_mut()
            .append(header::SET_COOKIE, HeaderValue::from_static(CLEAR_COOKIE));
    }
    response
}

fn read_flash(parts: &Parts) -> Option<FlashMessage> {
    let raw = parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == FLASH_COOKIE {
                Some(val.to_string())
            } else {
                None
            }
        })?;

    let pair = format!("v={}", raw);
    let decoded = url::form_urlencoded::parse(pair.as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())?;

    let (level, message) = decoded.split_once(':')?;
    Some(FlashMessage {
        level: level.to_string(),
        message: message.to_string(),
    })
}
