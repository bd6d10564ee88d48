//! GraphQL schema assembly and the axum mount.
//!
//! The roots are merged objects, one sub-object per concern. Handlers
//! attach the raw session token and client IP as request data before
//! execution; resolvers attach `Set-Cookie` headers to the response,
//! which are forwarded onto the HTTP reply here.

use async_graphql::{
    Context, EmptySubscription, MergedObject, Schema,
    http::{GraphQLPlaygroundConfig, playground_source},
};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::api::auth::{
    AuthError, AuthState, RateLimitAction, RateLimitDecision,
    session::{self, SessionToken, authenticate_session},
    storage::{self, SessionRecord},
    utils::extract_client_ip,
};

mod account;
mod me;
mod password;
mod profile;
mod stats;
pub(crate) mod types;
mod validate;

#[derive(MergedObject, Default)]
pub struct QueryRoot(me::MeQuery, stats::StatsQuery);

#[derive(MergedObject, Default)]
pub struct MutationRoot(
    account::AccountMutation,
    password::PasswordMutation,
    profile::ProfileMutation,
);

pub type AppSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the executable schema with its shared state.
#[must_use]
pub fn schema(pool: PgPool, auth_state: Arc<AuthState>) -> AppSchema {
    Schema::build(
        QueryRoot::default(),
        MutationRoot::default(),
        EmptySubscription,
    )
    .data(pool)
    .data(auth_state)
    .finish()
}

/// Render the schema in SDL form, for frontend codegen.
/// State is only needed at execution time, so none is attached.
#[must_use]
pub fn sdl() -> String {
    Schema::build(
        QueryRoot::default(),
        MutationRoot::default(),
        EmptySubscription,
    )
    .finish()
    .sdl()
}

/// Client IP extracted from proxy headers, attached per request for
/// rate limiting.
pub(crate) struct ClientIp(pub(crate) Option<String>);

pub(crate) async fn graphql_post(
    Extension(schema): Extension<AppSchema>,
    headers: HeaderMap,
    payload: Option<Json<async_graphql::Request>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing GraphQL request".to_string()).into_response();
    };

    let mut request = request.data(ClientIp(extract_client_ip(&headers)));
    if let Some(token) = session::extract_session_token(&headers) {
        request = request.data(SessionToken(token));
    }

    let mut response = schema.execute(request).await;
    // Cookies set inside resolvers ride on the GraphQL response headers.
    let response_headers = std::mem::take(&mut response.http_headers);

    let body = match serde_json::to_string(&response) {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to serialize GraphQL response: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut reply = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response();
    reply.headers_mut().extend(response_headers);
    reply
}

pub(crate) async fn graphql_playground() -> impl IntoResponse {
    Html(playground_source(GraphQLPlaygroundConfig::new("/graphql")))
}

/// Log the fault and hide details behind a generic GraphQL error.
pub(super) fn internal_error(err: &anyhow::Error) -> async_graphql::Error {
    error!("Internal error serving GraphQL request: {err:#}");
    async_graphql::Error::new("internal error")
}

/// Resolve the session or fail the field with "not authenticated".
pub(super) async fn require_session(ctx: &Context<'_>) -> async_graphql::Result<SessionRecord> {
    let pool = ctx.data::<PgPool>()?;
    match authenticate_session(ctx.data_opt::<SessionToken>(), pool).await {
        Ok(record) => Ok(record),
        Err(AuthError::NotAuthenticated) => Err(async_graphql::Error::new("not authenticated")),
        Err(AuthError::Internal(err)) => Err(internal_error(&err)),
    }
}

/// Create a session row and attach its cookie to the response.
pub(super) async fn start_session(
    ctx: &Context<'_>,
    pool: &PgPool,
    state: &AuthState,
    user_id: Uuid,
) -> anyhow::Result<()> {
    let token =
        storage::insert_session(pool, user_id, state.config().session_ttl_seconds()).await?;
    attach_session_cookie(ctx, state, &token);
    Ok(())
}

fn attach_session_cookie(ctx: &Context<'_>, state: &AuthState, token: &str) {
    match session::session_cookie(state.config(), token) {
        Ok(value) => {
            ctx.insert_http_header(header::SET_COOKIE, value);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
}

pub(super) fn attach_clear_session_cookie(ctx: &Context<'_>, state: &AuthState) {
    match session::clear_session_cookie(state.config()) {
        Ok(value) => {
            ctx.insert_http_header(header::SET_COOKIE, value);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
}

/// IP and per-identity rate limit check.
pub(super) fn rate_limited(
    ctx: &Context<'_>,
    state: &AuthState,
    email: Option<&str>,
    action: RateLimitAction,
) -> bool {
    let client_ip = ctx.data_opt::<ClientIp>().and_then(|ip| ip.0.as_deref());
    if state.rate_limiter().check_ip(client_ip, action) == RateLimitDecision::Limited {
        return true;
    }
    if let Some(email) = email {
        if state.rate_limiter().check_email(email, action) == RateLimitDecision::Limited {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::{AuthConfig, NoopRateLimiter};
    use anyhow::Result;
    use axum::body::to_bytes;
    use sqlx::postgres::PgPoolOptions;

    fn test_schema() -> Result<AppSchema> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let state = Arc::new(AuthState::new(config, Arc::new(NoopRateLimiter)));
        Ok(schema(pool, state))
    }

    #[test]
    fn sdl_lists_account_operations() {
        let sdl = sdl();
        for needle in [
            "register",
            "login",
            "logout",
            "me",
            "countUsers",
            "forgotPassword",
            "changePassword",
            "changeInfo",
            "deleteUser",
            "UserResponse",
            "FieldError",
            "RegisterInput",
            "LoginInput",
            "ChangeInfoInput",
        ] {
            assert!(sdl.contains(needle), "SDL missing {needle}:\n{sdl}");
        }
    }

    #[tokio::test]
    async fn graphql_post_missing_payload_is_bad_request() -> Result<()> {
        let schema = test_schema()?;
        let response = graphql_post(Extension(schema), HeaderMap::new(), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn playground_serves_html() -> Result<()> {
        let response = graphql_playground().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let html = String::from_utf8(body.to_vec())?;
        assert!(html.contains("/graphql"));
        Ok(())
    }
}
