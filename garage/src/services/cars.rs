//! Car service.

use std::sync::Arc;

use tracing::instrument;

use super::{UserService, not_found, or_not_found};
use crate::api::models::cars::{CarBulkCreate, CarCreate, CarUpdate};
use crate::cache::{CacheGate, car_key};
use crate::db::handlers::CarStore;
use crate::db::models::cars::{CarCreateDBRequest, CarDBResponse, CarFilter, CarUpdateDBRequest};
use crate::errors::Result;
use crate::types::{CarId, UserId, abbrev_uuid};

const RESOURCE: &str = "Car";

#[derive(Clone)]
pub struct CarService {
    repo: Arc<dyn CarStore>,
    users: UserService,
    cache: CacheGate,
}

impl CarService {
    pub fn new(repo: Arc<dyn CarStore>, users: UserService, cache: CacheGate) -> Self {
        Self { repo, users, cache }
    }

    /// An unknown owner surfaces as an invalid reference from the store.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn create(&self, request: CarCreate) -> Result<CarDBResponse> {
        let car = self.repo.create(&CarCreateDBRequest::from(request)).await?;
        tracing::info!(car_id = %abbrev_uuid(&car.id), "Created car");
        Ok(car)
    }

    /// All cars are created in one transaction, or none are.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&request.user_id), count = request.cars.len()), err)]
    pub async fn create_bulk(&self, request: CarBulkCreate) -> Result<Vec<CarDBResponse>> {
        let cars = self.repo.create_bulk(&request.into_requests()).await?;
        tracing::info!(count = cars.len(), "Created cars in bulk");
        Ok(cars)
    }

    #[instrument(skip(self), fields(car_id = %abbrev_uuid(&id)), err)]
    pub async fn get(&self, id: CarId) -> Result<CarDBResponse> {
        let car = self.cache.get_or_load(&car_key(&id), || self.repo.get_by_id(id)).await?;
        car.ok_or_else(|| not_found(RESOURCE, id))
    }

    #[instrument(skip_all, err)]
    pub async fn list(&self, filter: &CarFilter) -> Result<(Vec<CarDBResponse>, i64)> {
        Ok(self.repo.list(filter).await?)
    }

    /// Cars owned by `user_id`; the owner must exist.
    #[instrument(skip(self, filter), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&self, user_id: UserId, filter: CarFilter) -> Result<(Vec<CarDBResponse>, i64)> {
        self.users.get(user_id).await?;
        let filter = CarFilter {
            user_id: Some(user_id),
            ..filter
        };
        self.list(&filter).await
    }

    /// Merge-patch update. Fields absent from `patch` keep their stored value.
    #[instrument(skip(self, patch), fields(car_id = %abbrev_uuid(&id)), err)]
    pub async fn update(&self, id: CarId, patch: CarUpdate) -> Result<CarDBResponse> {
        let existing = self.repo.get_by_id(id).await?.ok_or_else(|| not_found(RESOURCE, id))?;

        let merged = CarUpdateDBRequest::merge(&existing, patch);
        self.repo.update(id, &merged).await.map_err(or_not_found(RESOURCE, id))?;

        self.refetch(id).await
    }

    #[instrument(skip(self), fields(car_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&self, id: CarId) -> Result<()> {
        self.repo.delete(id).await.map_err(or_not_found(RESOURCE, id))?;
        self.cache.invalidate_logged(&car_key(&id)).await;
        Ok(())
    }

    #[instrument(skip(self), fields(car_id = %abbrev_uuid(&id), new_owner = %abbrev_uuid(&new_owner)), err)]
    pub async fn transfer(&self, id: CarId, new_owner: UserId) -> Result<CarDBResponse> {
        self.repo.transfer(id, new_owner).await.map_err(or_not_found(RESOURCE, id))?;
        self.refetch(id).await
    }

    /// Invalidate, then reload the committed row and cache it.
    async fn refetch(&self, id: CarId) -> Result<CarDBResponse> {
        let key = car_key(&id);
        self.cache.invalidate_logged(&key).await;
        let car = self.cache.refresh(&key, || self.repo.get_by_id(id)).await?;
        car.ok_or_else(|| not_found(RESOURCE, id))
    }

    /// Returns the ids that existed and were updated; unknown ids are skipped.
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn set_availability(&self, ids: &[CarId], is_available: bool) -> Result<Vec<CarId>> {
        let updated = self.repo.set_availability(ids, is_available).await?;
        for id in &updated {
            self.cache.invalidate_logged(&car_key(id)).await;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::cars::CarBulkItem;
    use crate::api::models::users::UserCreate;
    use crate::db::errors::DbError;
    use crate::errors::Error;
    use crate::test_utils::{CacheCall, InMemoryCars, InMemoryUsers, MemoryCache};
    use std::time::Duration;

    struct Fixture {
        cars: CarService,
        users: UserService,
        repo: Arc<InMemoryCars>,
        cache: Arc<MemoryCache>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(MemoryCache::default());
        let gate = CacheGate::new(cache.clone(), Duration::from_secs(60));
        let user_repo = Arc::new(InMemoryUsers::default());
        let repo = Arc::new(InMemoryCars::new(user_repo.clone()));
        let users = UserService::new(user_repo, gate.clone());
        let cars = CarService::new(repo.clone(), users.clone(), gate);
        Fixture { cars, users, repo, cache }
    }

    async fn owner(users: &UserService, email: &str) -> UserId {
        users
            .create(UserCreate {
                name: "Owner".into(),
                email: email.into(),
                age: 30,
            })
            .await
            .unwrap()
            .id
    }

    fn car(user_id: UserId, plate: &str) -> CarCreate {
        CarCreate {
            user_id,
            brand: "Toyota".into(),
            model: "Corolla".into(),
            year: 2020,
            color: Some("blue".into()),
            license_plate: plate.into(),
        }
    }

    #[tokio::test]
    async fn test_create_with_unknown_owner_is_invalid_reference() {
        let f = fixture();
        let err = f.cars.create(car(uuid::Uuid::new_v4(), "X 1")).await.unwrap_err();
        assert!(matches!(err, Error::Database(DbError::ForeignKeyViolation { .. })));
    }

    #[tokio::test]
    async fn test_update_invalidates_and_refetches() {
        let f = fixture();
        let user_id = owner(&f.users, "o@example.com").await;
        let created = f.cars.create(car(user_id, "U 1")).await.unwrap();
        f.cars.get(created.id).await.unwrap();

        let updated = f
            .cars
            .update(
                created.id,
                CarUpdate {
                    color: Some("green".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.color.as_deref(), Some("green"));
        assert_eq!(updated.brand, "Toyota");

        let cached: CarDBResponse = serde_json::from_str(&f.cache.raw(&car_key(&created.id)).unwrap()).unwrap();
        assert_eq!(cached, f.repo.stored(created.id).unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_car_is_not_found() {
        let f = fixture();
        let err = f.cars.update(uuid::Uuid::new_v4(), CarUpdate::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref resource, .. } if resource == "Car"));
        assert!(f.cache.ops().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_moves_owner_and_invalidates() {
        let f = fixture();
        let first = owner(&f.users, "first@example.com").await;
        let second = owner(&f.users, "second@example.com").await;
        let created = f.cars.create(car(first, "T 1")).await.unwrap();
        f.cars.get(created.id).await.unwrap();

        let moved = f.cars.transfer(created.id, second).await.unwrap();
        assert_eq!(moved.user_id, second);
        assert_eq!(f.cars.get(created.id).await.unwrap().user_id, second);

        let err = f.cars.transfer(uuid::Uuid::new_v4(), second).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_transfer_with_failed_invalidation_returns_committed_owner() {
        let f = fixture();
        let first = owner(&f.users, "stale1@example.com").await;
        let second = owner(&f.users, "stale2@example.com").await;
        let created = f.cars.create(car(first, "S 1")).await.unwrap();
        f.cars.get(created.id).await.unwrap();
        f.cache.fail_call(CacheCall::Del);

        let moved = f.cars.transfer(created.id, second).await.unwrap();
        assert_eq!(moved.user_id, second);

        // The entry cached before the transfer was overwritten, not served
        assert_eq!(f.cars.get(created.id).await.unwrap().user_id, second);
        assert_eq!(f.repo.stored(created.id).unwrap().user_id, second);
    }

    #[tokio::test]
    async fn test_bulk_create_is_atomic() {
        let f = fixture();
        let user_id = owner(&f.users, "bulk@example.com").await;
        let item = |plate: &str| CarBulkItem {
            brand: "Honda".into(),
            model: "Jazz".into(),
            year: 2015,
            color: None,
            license_plate: plate.into(),
        };

        let duplicate = CarBulkCreate {
            user_id,
            cars: vec![item("B 1"), item("B 1")],
        };
        assert!(matches!(
            f.cars.create_bulk(duplicate).await,
            Err(Error::Database(DbError::UniqueViolation { .. }))
        ));
        assert_eq!(f.repo.count(), 0);

        let ok = CarBulkCreate {
            user_id,
            cars: vec![item("B 1"), item("B 2")],
        };
        assert_eq!(f.cars.create_bulk(ok).await.unwrap().len(), 2);
        assert_eq!(f.repo.count(), 2);
    }

    #[tokio::test]
    async fn test_list_for_missing_user_is_not_found() {
        let f = fixture();
        let err = f.cars.list_for_user(uuid::Uuid::new_v4(), CarFilter::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref resource, .. } if resource == "User"));
    }

    #[tokio::test]
    async fn test_list_for_user_scopes_to_owner() {
        let f = fixture();
        let first = owner(&f.users, "a@example.com").await;
        let second = owner(&f.users, "b@example.com").await;
        f.cars.create(car(first, "L 1")).await.unwrap();
        f.cars.create(car(second, "L 2")).await.unwrap();

        let (cars, total) = f.cars.list_for_user(first, CarFilter::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(cars[0].user_id, first);
    }

    #[tokio::test]
    async fn test_set_availability_invalidates_existing_ids() {
        let f = fixture();
        let user_id = owner(&f.users, "av@example.com").await;
        let created = f.cars.create(car(user_id, "A 1")).await.unwrap();
        f.cars.get(created.id).await.unwrap();

        let missing = uuid::Uuid::new_v4();
        let updated = f.cars.set_availability(&[created.id, missing], false).await.unwrap();
        assert_eq!(updated, vec![created.id]);
        assert!(f.cache.raw(&car_key(&created.id)).is_none());
        assert!(!f.cars.get(created.id).await.unwrap().is_available);
    }
}
