//! Aggregate account statistics.

use async_graphql::{Context, Object, Result as GqlResult};
use sqlx::PgPool;

use super::internal_error;
use crate::api::auth::storage;

#[derive(Default)]
pub(super) struct StatsQuery;

#[Object]
impl StatsQuery {
    /// Total number of registered accounts.
    async fn count_users(&self, ctx: &Context<'_>) -> GqlResult<i64> {
        let pool = ctx.data::<PgPool>()?;
        storage::count_users(pool)
            .await
            .map_err(|err| internal_error(&err))
    }
}
