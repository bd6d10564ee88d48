//! Password reset: request a token by email, then consume it.

use async_graphql::{Context, Object, Result as GqlResult};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

use super::{
    internal_error, rate_limited, start_session,
    types::{FieldError, UserResponse},
    validate,
};
use crate::api::auth::{AuthState, RateLimitAction, password, storage, utils};

#[derive(Default)]
pub(super) struct PasswordMutation;

#[Object]
impl PasswordMutation {
    /// Queue a reset email. Always answers true so the response never
    /// reveals whether an address has an account.
    async fn forgot_password(&self, ctx: &Context<'_>, email: String) -> GqlResult<bool> {
        let pool = ctx.data::<PgPool>()?;
        let state = ctx.data::<Arc<AuthState>>()?;

        let email = utils::normalize_email(&email);
        if !utils::valid_email(&email) {
            return Ok(true);
        }

        if rate_limited(ctx, state, Some(&email), RateLimitAction::ForgotPassword) {
            return Err(async_graphql::Error::new("rate limited"));
        }

        match storage::enqueue_password_reset(pool, &email, state.config()).await {
            Ok(outcome) => {
                debug!(outcome = ?outcome, "forgot-password request");
                Ok(true)
            }
            Err(err) => Err(internal_error(&err)),
        }
    }

    /// Set a new password using an emailed reset token, then sign the
    /// user in. Consuming the token revokes every other session.
    async fn change_password(
        &self,
        ctx: &Context<'_>,
        token: String,
        new_password: String,
        confirm_new_password: String,
    ) -> GqlResult<UserResponse> {
        let pool = ctx.data::<PgPool>()?;
        let state = ctx.data::<Arc<AuthState>>()?;

        let mut errors = Vec::new();
        if let Some(err) = validate::validate_new_password("newPassword", &new_password) {
            errors.push(err);
        }
        if new_password != confirm_new_password {
            errors.push(FieldError::new(
                "confirmNewPassword",
                "passwords do not match",
            ));
        }
        let token = token.trim();
        if token.is_empty() {
            errors.push(token_error());
        }
        if !errors.is_empty() {
            return Ok(UserResponse::from_errors(errors));
        }

        let password_hash =
            password::hash_password(&new_password).map_err(|err| internal_error(&err))?;
        let token_hash = utils::hash_reset_token(token);

        match storage::reset_password(pool, &token_hash, &password_hash).await {
            Ok(Some(user)) => {
                start_session(ctx, pool, state, user.id)
                    .await
                    .map_err(|err| internal_error(&err))?;
                Ok(UserResponse::from_user(user.into()))
            }
            Ok(None) => Ok(UserResponse::from_errors(vec![token_error()])),
            Err(err) => Err(internal_error(&err)),
        }
    }
}

fn token_error() -> FieldError {
    FieldError::new("token", "token expired or invalid")
}
