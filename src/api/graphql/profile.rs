//! Authenticated profile edits and account deletion.

use async_graphql::{Context, Object, Result as GqlResult};
use sqlx::PgPool;
use std::sync::Arc;

use super::{
    attach_clear_session_cookie, internal_error, require_session,
    types::{ChangeInfoInput, UserResponse},
    validate,
};
use crate::api::auth::{
    AuthState,
    storage::{self, ImageUpdate, UpdateOutcome},
    utils,
};

#[derive(Default)]
pub(super) struct ProfileMutation;

#[Object]
impl ProfileMutation {
    /// Update username, email, and/or profile image for the signed-in
    /// account. Absent or blank fields keep their stored value; an
    /// explicitly empty imageUrl clears the image.
    async fn change_info(
        &self,
        ctx: &Context<'_>,
        input: ChangeInfoInput,
    ) -> GqlResult<UserResponse> {
        let pool = ctx.data::<PgPool>()?;
        let session = require_session(ctx).await?;

        let username = input
            .username
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let email = input
            .email
            .as_deref()
            .map(utils::normalize_email)
            .filter(|value| !value.is_empty());
        let image = match input.image_url.as_deref().map(str::trim) {
            None => ImageUpdate::Keep,
            Some("") => ImageUpdate::Clear,
            Some(url) => ImageUpdate::Set(url.to_string()),
        };

        let mut errors = Vec::new();
        if let Some(username) = username.as_deref() {
            if let Some(err) = validate::validate_username(username) {
                errors.push(err);
            }
        }
        if let Some(email) = email.as_deref() {
            if let Some(err) = validate::validate_email(email) {
                errors.push(err);
            }
        }
        if let ImageUpdate::Set(url) = &image {
            if let Some(err) = validate::validate_image_url(url) {
                errors.push(err);
            }
        }
        if !errors.is_empty() {
            return Ok(UserResponse::from_errors(errors));
        }

        // Nothing to change: echo the current profile.
        if username.is_none() && email.is_none() && matches!(image, ImageUpdate::Keep) {
            let user = storage::fetch_user(pool, session.user_id)
                .await
                .map_err(|err| internal_error(&err))?;
            return match user {
                Some(user) => Ok(UserResponse::from_user(user.into())),
                None => Err(async_graphql::Error::new("not authenticated")),
            };
        }

        match storage::update_user_info(
            pool,
            session.user_id,
            username.as_deref(),
            email.as_deref(),
            &image,
        )
        .await
        {
            Ok(UpdateOutcome::Updated(user)) => Ok(UserResponse::from_user(user.into())),
            Ok(UpdateOutcome::Conflict(field)) => Ok(UserResponse::from_errors(vec![
                validate::conflict_error(field),
            ])),
            // Session outlived the user row; treat like a dead session.
            Ok(UpdateOutcome::Missing) => Err(async_graphql::Error::new("not authenticated")),
            Err(err) => Err(internal_error(&err)),
        }
    }

    /// Permanently delete the signed-in account; sessions and pending
    /// reset tokens go with it via cascade.
    async fn delete_user(&self, ctx: &Context<'_>) -> GqlResult<bool> {
        let pool = ctx.data::<PgPool>()?;
        let state = ctx.data::<Arc<AuthState>>()?;
        let session = require_session(ctx).await?;

        let deleted = storage::delete_user(pool, session.user_id)
            .await
            .map_err(|err| internal_error(&err))?;

        attach_clear_session_cookie(ctx, state);
        Ok(deleted)
    }
}
