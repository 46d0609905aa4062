//! User service.

use std::sync::Arc;

use tracing::instrument;

use super::{not_found, or_not_found};
use crate::api::models::users::{UserCreate, UserUpdate};
use crate::cache::{CacheGate, user_key};
use crate::db::handlers::UserStore;
use crate::db::models::users::{UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest};
use crate::errors::Result;
use crate::types::{UserId, abbrev_uuid};

const RESOURCE: &str = "User";

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserStore>,
    cache: CacheGate,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserStore>, cache: CacheGate) -> Self {
        Self { repo, cache }
    }

    #[instrument(skip_all, err)]
    pub async fn create(&self, request: UserCreate) -> Result<UserDBResponse> {
        let user = self.repo.create(&UserCreateDBRequest::from(request)).await?;
        tracing::info!(user_id = %abbrev_uuid(&user.id), "Created user");
        Ok(user)
    }

    /// Read through the cache.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn get(&self, id: UserId) -> Result<UserDBResponse> {
        let user = self.cache.get_or_load(&user_key(&id), || self.repo.get_by_id(id)).await?;
        user.ok_or_else(|| not_found(RESOURCE, id))
    }

    /// Lists bypass the cache.
    #[instrument(skip_all, err)]
    pub async fn list(&self, filter: &UserFilter) -> Result<(Vec<UserDBResponse>, i64)> {
        Ok(self.repo.list(filter).await?)
    }

    /// Merge-patch update. Fields absent from `patch` keep their stored value.
    #[instrument(skip(self, patch), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn update(&self, id: UserId, patch: UserUpdate) -> Result<UserDBResponse> {
        let existing = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| not_found(RESOURCE, id))?;

        let merged = UserUpdateDBRequest::merge(&existing, patch);
        self.repo.update(id, &merged).await.map_err(or_not_found(RESOURCE, id))?;

        let key = user_key(&id);
        self.cache.invalidate_logged(&key).await;
        let user = self.cache.refresh(&key, || self.repo.get_by_id(id)).await?;
        user.ok_or_else(|| not_found(RESOURCE, id))
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&self, id: UserId) -> Result<()> {
        self.repo.delete(id).await.map_err(or_not_found(RESOURCE, id))?;
        self.cache.invalidate_logged(&user_key(&id)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::test_utils::{CacheCall, CacheOp, InMemoryUsers, MemoryCache};
    use std::time::Duration;

    fn service() -> (UserService, Arc<InMemoryUsers>, Arc<MemoryCache>) {
        let repo = Arc::new(InMemoryUsers::default());
        let cache = Arc::new(MemoryCache::default());
        let service = UserService::new(repo.clone(), CacheGate::new(cache.clone(), Duration::from_secs(60)));
        (service, repo, cache)
    }

    fn ada() -> UserCreate {
        UserCreate {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            age: 36,
        }
    }

    #[tokio::test]
    async fn test_get_populates_cache_then_hits() {
        let (service, repo, cache) = service();
        let user = service.create(ada()).await.unwrap();

        assert_eq!(service.get(user.id).await.unwrap(), user);
        assert!(cache.raw(&user_key(&user.id)).is_some());

        assert_eq!(service.get(user.id).await.unwrap(), user);
        assert_eq!(repo.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (service, _, cache) = service();
        let err = service.get(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(!cache.ops().iter().any(|op| matches!(op, CacheOp::Set(_))));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found_without_cache_mutation() {
        let (service, _, cache) = service();
        let patch = UserUpdate {
            name: Some("Nobody".into()),
            ..Default::default()
        };
        let err = service.update(uuid::Uuid::new_v4(), patch).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(cache.ops().is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_and_repopulates_from_store() {
        let (service, repo, cache) = service();
        let user = service.create(ada()).await.unwrap();
        service.get(user.id).await.unwrap();

        let updated = service
            .update(
                user.id,
                UserUpdate {
                    age: Some(37),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.age, 37);
        assert_eq!(updated.name, "Ada");
        assert!(updated.updated_at > user.updated_at);

        let stored = repo.stored(user.id).unwrap();
        let cached: UserDBResponse = serde_json::from_str(&cache.raw(&user_key(&user.id)).unwrap()).unwrap();
        assert_eq!(cached, stored);
        assert!(cache.ops().contains(&CacheOp::Del(user_key(&user.id))));
    }

    #[tokio::test]
    async fn test_update_with_failed_invalidation_returns_committed_row() {
        let (service, repo, cache) = service();
        let user = service.create(ada()).await.unwrap();
        service.get(user.id).await.unwrap();
        cache.fail_call(CacheCall::Del);

        let updated = service
            .update(
                user.id,
                UserUpdate {
                    age: Some(37),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.age, 37);
        assert_eq!(repo.stored(user.id).unwrap().age, 37);

        let cached: UserDBResponse = serde_json::from_str(&cache.raw(&user_key(&user.id)).unwrap()).unwrap();
        assert_eq!(cached.age, 37);
        assert_eq!(service.get(user.id).await.unwrap().age, 37);
    }

    #[tokio::test]
    async fn test_empty_patch_keeps_data() {
        let (service, _, _) = service();
        let user = service.create(ada()).await.unwrap();
        let updated = service.update(user.id, UserUpdate::default()).await.unwrap();
        assert_eq!(
            (updated.name, updated.email, updated.age, updated.is_active),
            (user.name, user.email, user.age, user.is_active)
        );
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let (service, _, cache) = service();
        let user = service.create(ada()).await.unwrap();
        service.get(user.id).await.unwrap();

        service.delete(user.id).await.unwrap();
        assert!(cache.raw(&user_key(&user.id)).is_none());
        assert!(matches!(service.get(user.id).await, Err(Error::NotFound { .. })));
        assert!(matches!(service.delete(user.id).await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_cache_outage_does_not_fail_writes() {
        let (service, _, cache) = service();
        let user = service.create(ada()).await.unwrap();
        cache.set_failing(true);

        let updated = service
            .update(
                user.id,
                UserUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.is_active);
        service.delete(user.id).await.unwrap();
    }
}
