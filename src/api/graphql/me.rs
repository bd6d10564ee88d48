//! Current-user query.

use async_graphql::{Context, Object, Result as GqlResult};
use sqlx::PgPool;

use super::{internal_error, types::User};
use crate::api::auth::{
    AuthError,
    session::{SessionToken, authenticate_session},
    storage,
};

#[derive(Default)]
pub(super) struct MeQuery;

#[Object]
impl MeQuery {
    /// Account behind the presented session cookie, or null when signed out.
    async fn me(&self, ctx: &Context<'_>) -> GqlResult<Option<User>> {
        let pool = ctx.data::<PgPool>()?;
        match authenticate_session(ctx.data_opt::<SessionToken>(), pool).await {
            Ok(record) => {
                let user = storage::fetch_user(pool, record.user_id)
                    .await
                    .map_err(|err| internal_error(&err))?;
                Ok(user.map(User::from))
            }
            // A stale or missing cookie is an anonymous visitor, not an error.
            Err(AuthError::NotAuthenticated) => Ok(None),
            Err(AuthError::Internal(err)) => Err(internal_error(&err)),
        }
    }
}
