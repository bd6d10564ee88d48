//! Session cookie handling and resolution.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, InvalidHeaderValue},
};
use sqlx::PgPool;

use super::{
    AuthError,
    state::AuthConfig,
    storage::{SessionRecord, lookup_session},
    utils::hash_session_token,
};

const SESSION_COOKIE_NAME: &str = "konto_session";

/// Raw session token as presented by the client, attached to each
/// GraphQL request before execution.
pub(crate) struct SessionToken(pub(crate) String);

/// Resolve a presented token into a session record.
///
/// Missing, unknown, and expired tokens all map to `NotAuthenticated`;
/// only infrastructure faults surface as `Internal`.
pub(crate) async fn authenticate_session(
    token: Option<&SessionToken>,
    pool: &PgPool,
) -> Result<SessionRecord, AuthError> {
    let Some(token) = token else {
        return Err(AuthError::NotAuthenticated);
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_session_token(&token.0);
    match lookup_session(pool, &token_hash).await {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(AuthError::NotAuthenticated),
        Err(err) => Err(AuthError::Internal(err)),
    }
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Cookie that expires immediately, used by logout and account deletion.
pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == SESSION_COOKIE_NAME {
            let val = val.trim();
            if !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
