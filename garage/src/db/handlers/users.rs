//! Database repository for users.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::db::errors::Result;
use crate::db::handlers::repository::{Repository, affected};
use crate::db::models::users::{UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest};
use crate::db::queries::{Bindings, QueryTemplates};
use crate::types::{UserId, abbrev_uuid};

/// The user repository as seen by the service layer.
pub trait UserStore:
    Repository<
        CreateRequest = UserCreateDBRequest,
        UpdateRequest = UserUpdateDBRequest,
        Response = UserDBResponse,
        Id = UserId,
        Filter = UserFilter,
    >
{
}

impl<T> UserStore for T where
    T: Repository<
            CreateRequest = UserCreateDBRequest,
            UpdateRequest = UserUpdateDBRequest,
            Response = UserDBResponse,
            Id = UserId,
            Filter = UserFilter,
        >
{
}

/// Postgres-backed user repository.
pub struct Users {
    pool: PgPool,
    queries: Arc<QueryTemplates>,
}

impl Users {
    pub fn new(pool: PgPool, queries: Arc<QueryTemplates>) -> Self {
        Self { pool, queries }
    }
}

fn filter_bindings(filter: &UserFilter) -> Bindings {
    Bindings::new()
        .bind_opt("name", filter.name.clone())
        .bind_opt("email", filter.email.clone())
        .bind_opt("min_age", filter.min_age)
        .bind_opt("max_age", filter.max_age)
}

#[async_trait::async_trait]
impl Repository for Users {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let query = self.queries.resolve(
            "CreateUser",
            &Bindings::new()
                .bind("id", Uuid::new_v4())
                .bind("name", request.name.as_str())
                .bind("email", request.email.as_str())
                .bind("age", request.age)
                .bind("is_active", request.is_active),
        )?;

        let user = sqlx::query_as_with::<_, UserDBResponse, _>(&query.sql, query.arguments()?)
            .fetch_one(&self.pool)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&self, id: Self::Id) -> Result<Option<Self::Response>> {
        let query = self.queries.resolve("FindUserById", &Bindings::new().bind("id", id))?;

        let user = sqlx::query_as_with::<_, UserDBResponse, _>(&query.sql, query.arguments()?)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, filter), fields(page = filter.page.page, page_size = filter.page.page_size), err)]
    async fn list(&self, filter: &Self::Filter) -> Result<(Vec<Self::Response>, i64)> {
        let predicate = filter_bindings(filter);
        let page = self.queries.resolve(
            "FindAllUsersBase",
            &predicate
                .clone()
                .bind("limit", filter.page.limit())
                .bind("offset", filter.page.offset())
                .ident("sort_by", &filter.sort_by)
                .ident("sort_dir", &filter.sort_dir),
        )?;
        let count = self.queries.resolve("CountUsersBase", &predicate)?;

        let (users, total) = tokio::try_join!(
            sqlx::query_as_with::<_, UserDBResponse, _>(&page.sql, page.arguments()?).fetch_all(&self.pool),
            sqlx::query_scalar_with::<_, i64, _>(&count.sql, count.arguments()?).fetch_one(&self.pool),
        )?;

        Ok((users, total))
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&self, id: Self::Id, request: &Self::UpdateRequest) -> Result<u64> {
        let query = self.queries.resolve(
            "UpdateUser",
            &Bindings::new()
                .bind("id", id)
                .bind("name", request.name.as_str())
                .bind("email", request.email.as_str())
                .bind("age", request.age)
                .bind("is_active", request.is_active),
        )?;

        let result = sqlx::query_with(&query.sql, query.arguments()?).execute(&self.pool).await?;
        affected(result.rows_affected())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&self, id: Self::Id) -> Result<u64> {
        let query = self.queries.resolve("DeleteUser", &Bindings::new().bind("id", id))?;

        let result = sqlx::query_with(&query.sql, query.arguments()?).execute(&self.pool).await?;
        affected(result.rows_affected())
    }
}
