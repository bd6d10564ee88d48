//! Registration, login, and logout.

use async_graphql::{Context, Object, Result as GqlResult};
use sqlx::PgPool;
use std::sync::Arc;

use super::{
    attach_clear_session_cookie, internal_error, rate_limited, start_session,
    types::{LoginInput, RegisterInput, UserResponse},
    validate,
};
use crate::api::auth::{
    AuthState, RateLimitAction, password,
    session::SessionToken,
    storage::{self, SignupOutcome},
    utils,
};

#[derive(Default)]
pub(super) struct AccountMutation;

#[Object]
impl AccountMutation {
    /// Create an account and sign the new user in.
    async fn register(
        &self,
        ctx: &Context<'_>,
        options: RegisterInput,
    ) -> GqlResult<UserResponse> {
        let pool = ctx.data::<PgPool>()?;
        let state = ctx.data::<Arc<AuthState>>()?;

        let username = options.username.trim().to_string();
        let email = utils::normalize_email(&options.email);

        let errors = validate::validate_register(&username, &email, &options.password);
        if !errors.is_empty() {
            return Ok(UserResponse::from_errors(errors));
        }

        if rate_limited(ctx, state, Some(&email), RateLimitAction::Register) {
            return Err(async_graphql::Error::new("rate limited"));
        }

        let password_hash =
            password::hash_password(&options.password).map_err(|err| internal_error(&err))?;

        match storage::insert_user(pool, &username, &email, &password_hash).await {
            Ok(SignupOutcome::Created(user)) => {
                start_session(ctx, pool, state, user.id)
                    .await
                    .map_err(|err| internal_error(&err))?;
                Ok(UserResponse::from_user(user.into()))
            }
            Ok(SignupOutcome::Conflict(field)) => Ok(UserResponse::from_errors(vec![
                validate::conflict_error(field),
            ])),
            Err(err) => Err(internal_error(&err)),
        }
    }

    /// Log in with username or email. Failures share one generic error
    /// so callers cannot tell which part was wrong.
    async fn login(&self, ctx: &Context<'_>, options: LoginInput) -> GqlResult<UserResponse> {
        let pool = ctx.data::<PgPool>()?;
        let state = ctx.data::<Arc<AuthState>>()?;

        // An @ means the identifier is an email; usernames cannot contain one.
        let identity = options.username_or_email.trim();
        let identity = if identity.contains('@') {
            utils::normalize_email(identity)
        } else {
            identity.to_string()
        };

        if identity.is_empty() || options.password.is_empty() {
            return Ok(login_error());
        }

        if rate_limited(ctx, state, Some(&identity), RateLimitAction::Login) {
            return Err(async_graphql::Error::new("rate limited"));
        }

        let record = match storage::lookup_credentials(pool, &identity).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                // Unknown identities still pay one argon2 verification.
                let _ = password::verify_password(&options.password, password::DUMMY_HASH);
                return Ok(login_error());
            }
            Err(err) => return Err(internal_error(&err)),
        };

        let verified = password::verify_password(&options.password, &record.password_hash)
            .map_err(|err| internal_error(&err))?;
        if !verified {
            return Ok(login_error());
        }

        start_session(ctx, pool, state, record.user.id)
            .await
            .map_err(|err| internal_error(&err))?;
        Ok(UserResponse::from_user(record.user.into()))
    }

    /// Drop the current session; true when a row was actually removed.
    async fn logout(&self, ctx: &Context<'_>) -> GqlResult<bool> {
        let pool = ctx.data::<PgPool>()?;
        let state = ctx.data::<Arc<AuthState>>()?;

        let removed = match ctx.data_opt::<SessionToken>() {
            Some(token) => {
                let token_hash = utils::hash_session_token(&token.0);
                storage::delete_session(pool, &token_hash)
                    .await
                    .map_err(|err| internal_error(&err))?
            }
            None => false,
        };

        // Always clear the cookie, even if the session record was missing.
        attach_clear_session_cookie(ctx, state);
        Ok(removed)
    }
}

fn login_error() -> UserResponse {
    UserResponse::from_field_error("usernameOrEmail", "invalid username, email or password")
}
