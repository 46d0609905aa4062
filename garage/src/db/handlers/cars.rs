//! Database repository for cars.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::db::errors::Result;
use crate::db::handlers::repository::{Repository, affected};
use crate::db::models::cars::{CarCreateDBRequest, CarDBResponse, CarFilter, CarUpdateDBRequest};
use crate::db::queries::{Bindings, QueryTemplates};
use crate::types::{CarId, UserId, abbrev_uuid};

/// The car repository as seen by the service layer.
#[async_trait::async_trait]
pub trait CarStore:
    Repository<
        CreateRequest = CarCreateDBRequest,
        UpdateRequest = CarUpdateDBRequest,
        Response = CarDBResponse,
        Id = CarId,
        Filter = CarFilter,
    >
{
    /// Insert every car or none of them.
    async fn create_bulk(&self, requests: &[CarCreateDBRequest]) -> Result<Vec<CarDBResponse>>;

    /// Move a car to a new owner.
    async fn transfer(&self, id: CarId, new_owner: UserId) -> Result<u64>;

    /// Set `is_available` on every listed car; returns the ids that existed.
    async fn set_availability(&self, ids: &[CarId], is_available: bool) -> Result<Vec<CarId>>;
}

/// Postgres-backed car repository.
pub struct Cars {
    pool: PgPool,
    queries: Arc<QueryTemplates>,
}

impl Cars {
    pub fn new(pool: PgPool, queries: Arc<QueryTemplates>) -> Self {
        Self { pool, queries }
    }

    fn create_bindings(request: &CarCreateDBRequest) -> Bindings {
        Bindings::new()
            .bind("id", Uuid::new_v4())
            .bind("user_id", request.user_id)
            .bind("brand", request.brand.as_str())
            .bind("model", request.model.as_str())
            .bind("year", request.year)
            .bind("color", request.color.clone())
            .bind("license_plate", request.license_plate.as_str())
            .bind("is_available", request.is_available)
    }
}

fn filter_bindings(filter: &CarFilter) -> Bindings {
    Bindings::new()
        .bind_opt("user_id", filter.user_id)
        .bind_opt("brand", filter.brand.clone())
        .bind_opt("is_available", filter.is_available)
}

#[async_trait::async_trait]
impl Repository for Cars {
    type CreateRequest = CarCreateDBRequest;
    type UpdateRequest = CarUpdateDBRequest;
    type Response = CarDBResponse;
    type Id = CarId;
    type Filter = CarFilter;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn create(&self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let query = self.queries.resolve("CreateCar", &Self::create_bindings(request))?;

        let car = sqlx::query_as_with::<_, CarDBResponse, _>(&query.sql, query.arguments()?)
            .fetch_one(&self.pool)
            .await?;

        Ok(car)
    }

    #[instrument(skip(self), fields(car_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&self, id: Self::Id) -> Result<Option<Self::Response>> {
        let query = self.queries.resolve("FindCarById", &Bindings::new().bind("id", id))?;

        let car = sqlx::query_as_with::<_, CarDBResponse, _>(&query.sql, query.arguments()?)
            .fetch_optional(&self.pool)
            .await?;

        Ok(car)
    }

    #[instrument(skip(self, filter), fields(page = filter.page.page, page_size = filter.page.page_size), err)]
    async fn list(&self, filter: &Self::Filter) -> Result<(Vec<Self::Response>, i64)> {
        let predicate = filter_bindings(filter);
        let page = self.queries.resolve(
            "FindAllCarsBase",
            &predicate
                .clone()
                .bind("limit", filter.page.limit())
                .bind("offset", filter.page.offset())
                .ident("sort_by", &filter.sort_by)
                .ident("sort_dir", &filter.sort_dir),
        )?;
        let count = self.queries.resolve("CountCarsBase", &predicate)?;

        let (cars, total) = tokio::try_join!(
            sqlx::query_as_with::<_, CarDBResponse, _>(&page.sql, page.arguments()?).fetch_all(&self.pool),
            sqlx::query_scalar_with::<_, i64, _>(&count.sql, count.arguments()?).fetch_one(&self.pool),
        )?;

        Ok((cars, total))
    }

    #[instrument(skip(self, request), fields(car_id = %abbrev_uuid(&id)), err)]
    async fn update(&self, id: Self::Id, request: &Self::UpdateRequest) -> Result<u64> {
        let query = self.queries.resolve(
            "UpdateCar",
            &Bindings::new()
                .bind("id", id)
                .bind("brand", request.brand.as_str())
                .bind("model", request.model.as_str())
                .bind("year", request.year)
                .bind("color", request.color.clone())
                .bind("license_plate", request.license_plate.as_str())
                .bind("is_available", request.is_available),
        )?;

        let result = sqlx::query_with(&query.sql, query.arguments()?).execute(&self.pool).await?;
        affected(result.rows_affected())
    }

    #[instrument(skip(self), fields(car_id = %abbrev_uuid(&id)), err)]
    async fn delete(&self, id: Self::Id) -> Result<u64> {
        let query = self.queries.resolve("DeleteCar", &Bindings::new().bind("id", id))?;

        let result = sqlx::query_with(&query.sql, query.arguments()?).execute(&self.pool).await?;
        affected(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl CarStore for Cars {
    #[instrument(skip(self, requests), fields(count = requests.len()), err)]
    async fn create_bulk(&self, requests: &[CarCreateDBRequest]) -> Result<Vec<CarDBResponse>> {
        let mut tx = self.pool.begin().await?;
        let mut cars = Vec::with_capacity(requests.len());

        for request in requests {
            let query = self.queries.resolve("CreateCar", &Self::create_bindings(request))?;
            let car = sqlx::query_as_with::<_, CarDBResponse, _>(&query.sql, query.arguments()?)
                .fetch_one(&mut *tx)
                .await?;
            cars.push(car);
        }

        tx.commit().await?;
        Ok(cars)
    }

    #[instrument(skip(self), fields(car_id = %abbrev_uuid(&id), new_owner = %abbrev_uuid(&new_owner)), err)]
    async fn transfer(&self, id: CarId, new_owner: UserId) -> Result<u64> {
        let query = self
            .queries
            .resolve("TransferCar", &Bindings::new().bind("id", id).bind("user_id", new_owner))?;

        let result = sqlx::query_with(&query.sql, query.arguments()?).execute(&self.pool).await?;
        affected(result.rows_affected())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn set_availability(&self, ids: &[CarId], is_available: bool) -> Result<Vec<CarId>> {
        let query = self.queries.resolve(
            "SetCarsAvailability",
            &Bindings::new().bind("ids", ids.to_vec()).bind("is_available", is_available),
        )?;

        let updated = sqlx::query_scalar_with::<_, CarId, _>(&query.sql, query.arguments()?)
            .fetch_all(&self.pool)
            .await?;

        Ok(updated)
    }
}
