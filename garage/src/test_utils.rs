//! In-memory doubles for the repositories and the cache, plus an HTTP test app built on them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum_test::TestServer;
use chrono::Utc;
use uuid::Uuid;

use crate::cache::{CacheError, CacheGate, CacheStore};
use crate::config::Config;
use crate::db::errors::{DbError, Result as DbResult};
use crate::db::handlers::{CarStore, Repository};
use crate::db::models::SortDir;
use crate::db::models::cars::{CarCreateDBRequest, CarDBResponse, CarFilter, CarSortField, CarUpdateDBRequest};
use crate::db::models::users::{UserCreateDBRequest, UserDBResponse, UserFilter, UserSortField, UserUpdateDBRequest};
use crate::limits::RateLimiter;
use crate::services::{CarService, UserService};
use crate::types::{CarId, UserId};
use crate::AppState;

/// A recorded cache call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    Get(String),
    Set(String),
    Del(String),
    Incr(String),
    Expire(String),
    Ttl(String),
}

impl CacheOp {
    fn call(&self) -> CacheCall {
        match self {
            CacheOp::Get(_) => CacheCall::Get,
            CacheOp::Set(_) => CacheCall::Set,
            CacheOp::Del(_) => CacheCall::Del,
            CacheOp::Incr(_) => CacheCall::Incr,
            CacheOp::Expire(_) => CacheCall::Expire,
            CacheOp::Ttl(_) => CacheCall::Ttl,
        }
    }
}

/// One kind of store call, for failing it alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCall {
    Get,
    Set,
    Del,
    Incr,
    Expire,
    Ttl,
}

/// In-memory [`CacheStore`] that records every call. Expiry is recorded, never enforced.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Option<Duration>)>>,
    ops: Mutex<Vec<CacheOp>>,
    failing: AtomicBool,
    /// Remaining failures per call kind; `None` fails forever
    call_failures: Mutex<HashMap<CacheCall, Option<usize>>>,
}

impl MemoryCache {
    /// Seed an entry without recording an operation.
    pub fn insert(&self, key: &str, raw: &str) {
        self.entries.lock().unwrap().insert(key.to_string(), (raw.to_string(), None));
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).map(|(raw, _)| raw.clone())
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries.lock().unwrap().get(key).and_then(|(_, ttl)| *ttl)
    }

    pub fn ops(&self) -> Vec<CacheOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Make every subsequent call fail as if the server were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every subsequent `call` fail while other calls keep working.
    pub fn fail_call(&self, call: CacheCall) {
        self.call_failures.lock().unwrap().insert(call, None);
    }

    /// Make only the next `times` calls of this kind fail.
    pub fn fail_call_times(&self, call: CacheCall, times: usize) {
        self.call_failures.lock().unwrap().insert(call, Some(times));
    }

    fn record(&self, op: CacheOp) -> Result<(), CacheError> {
        let call = op.call();
        self.ops.lock().unwrap().push(op);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache set to fail".to_string()));
        }

        let mut failures = self.call_failures.lock().unwrap();
        let fail = match failures.get_mut(&call) {
            Some(None) => true,
            Some(Some(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if fail {
            Err(CacheError::Command(format!("{call:?} set to fail")))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.record(CacheOp::Get(key.to_string()))?;
        Ok(self.raw(key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.record(CacheOp::Set(key.to_string()))?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Some(ttl)));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.record(CacheOp::Del(key.to_string()))?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.record(CacheOp::Incr(key.to_string()))?;
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_insert_with(|| ("0".to_string(), None));
        let next = entry
            .0
            .parse::<i64>()
            .map_err(|_| CacheError::Command("value is not an integer".to_string()))?
            + 1;
        entry.0 = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.record(CacheOp::Expire(key.to_string()))?;
        if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
            entry.1 = Some(ttl);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64, CacheError> {
        self.record(CacheOp::Ttl(key.to_string()))?;
        Ok(match self.entries.lock().unwrap().get(key) {
            Some((_, Some(ttl))) => ttl.as_secs() as i64,
            Some((_, None)) => -1,
            None => -2,
        })
    }
}

/// Advance `updated_at` strictly, like `NOW()` in a later transaction.
fn touch(previous: chrono::DateTime<Utc>) -> chrono::DateTime<Utc> {
    Utc::now().max(previous + chrono::Duration::milliseconds(1))
}

fn page_of<T: Clone>(mut rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX).min(rows.len());
    let limit = usize::try_from(limit).unwrap_or(0);
    rows.drain(offset..).take(limit).collect()
}

fn contains_ci(haystack: &str, needle: &Option<String>) -> bool {
    needle
        .as_ref()
        .is_none_or(|n| haystack.to_lowercase().contains(&n.to_lowercase()))
}

/// In-memory user repository with the same constraint behaviour as the Postgres one.
#[derive(Default)]
pub struct InMemoryUsers {
    rows: Mutex<HashMap<UserId, UserDBResponse>>,
    get_calls: AtomicUsize,
}

impl InMemoryUsers {
    /// Number of `get_by_id` calls so far.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn stored(&self, id: UserId) -> Option<UserDBResponse> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.rows.lock().unwrap().contains_key(&id)
    }

    fn email_taken(rows: &HashMap<UserId, UserDBResponse>, email: &str, except: Option<UserId>) -> bool {
        rows.values().any(|u| u.email == email && Some(u.id) != except)
    }
}

fn email_conflict() -> DbError {
    DbError::UniqueViolation {
        constraint: Some("users_email_unique".to_string()),
        table: Some("users".to_string()),
        message: "duplicate key value violates unique constraint \"users_email_unique\"".to_string(),
    }
}

#[async_trait::async_trait]
impl Repository for InMemoryUsers {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    async fn create(&self, request: &Self::CreateRequest) -> DbResult<Self::Response> {
        let mut rows = self.rows.lock().unwrap();
        if Self::email_taken(&rows, &request.email, None) {
            return Err(email_conflict());
        }
        let now = Utc::now();
        let user = UserDBResponse {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            email: request.email.clone(),
            age: request.age,
            is_active: request.is_active,
            created_at: now,
            updated_at: now,
        };
        rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_by_id(&self, id: Self::Id) -> DbResult<Option<Self::Response>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stored(id))
    }

    async fn list(&self, filter: &Self::Filter) -> DbResult<(Vec<Self::Response>, i64)> {
        let mut matching: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|u| contains_ci(&u.name, &filter.name) && contains_ci(&u.email, &filter.email))
            .filter(|u| filter.min_age.is_none_or(|min| u.age >= min) && filter.max_age.is_none_or(|max| u.age <= max))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ord = match filter.sort_by {
                UserSortField::Name => a.name.cmp(&b.name),
                UserSortField::Email => a.email.cmp(&b.email),
                UserSortField::Age => a.age.cmp(&b.age),
                UserSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                UserSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            }
            .then(a.id.cmp(&b.id));
            match filter.sort_dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        });

        let total = matching.len() as i64;
        Ok((page_of(matching, filter.page.limit(), filter.page.offset()), total))
    }

    async fn update(&self, id: Self::Id, request: &Self::UpdateRequest) -> DbResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        if Self::email_taken(&rows, &request.email, Some(id)) {
            return Err(email_conflict());
        }
        let user = rows.get_mut(&id).ok_or(DbError::NotFound)?;
        user.name = request.name.clone();
        user.email = request.email.clone();
        user.age = request.age;
        user.is_active = request.is_active;
        user.updated_at = touch(user.updated_at);
        Ok(1)
    }

    async fn delete(&self, id: Self::Id) -> DbResult<u64> {
        self.rows.lock().unwrap().remove(&id).map(|_| 1).ok_or(DbError::NotFound)
    }
}

/// In-memory car repository; owners are checked against the paired user repository.
pub struct InMemoryCars {
    rows: Mutex<HashMap<CarId, CarDBResponse>>,
    users: Arc<InMemoryUsers>,
}

impl InMemoryCars {
    pub fn new(users: Arc<InMemoryUsers>) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            users,
        }
    }

    pub fn stored(&self, id: CarId) -> Option<CarDBResponse> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn check_owner(&self, user_id: UserId) -> DbResult<()> {
        if self.users.contains(user_id) {
            Ok(())
        } else {
            Err(DbError::ForeignKeyViolation {
                constraint: Some("cars_user_id_fkey".to_string()),
                table: Some("cars".to_string()),
                message: "insert or update on table \"cars\" violates foreign key constraint".to_string(),
            })
        }
    }

    fn insert_checked(&self, rows: &mut HashMap<CarId, CarDBResponse>, request: &CarCreateDBRequest) -> DbResult<CarDBResponse> {
        self.check_owner(request.user_id)?;
        if rows.values().any(|c| c.license_plate == request.license_plate) {
            return Err(plate_conflict());
        }
        let now = Utc::now();
        let car = CarDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            brand: request.brand.clone(),
            model: request.model.clone(),
            year: request.year,
            color: request.color.clone(),
            license_plate: request.license_plate.clone(),
            is_available: request.is_available,
            created_at: now,
            updated_at: now,
        };
        rows.insert(car.id, car.clone());
        Ok(car)
    }
}

fn plate_conflict() -> DbError {
    DbError::UniqueViolation {
        constraint: Some("cars_license_plate_unique".to_string()),
        table: Some("cars".to_string()),
        message: "duplicate key value violates unique constraint \"cars_license_plate_unique\"".to_string(),
    }
}

#[async_trait::async_trait]
impl Repository for InMemoryCars {
    type CreateRequest = CarCreateDBRequest;
    type UpdateRequest = CarUpdateDBRequest;
    type Response = CarDBResponse;
    type Id = CarId;
    type Filter = CarFilter;

    async fn create(&self, request: &Self::CreateRequest) -> DbResult<Self::Response> {
        let mut rows = self.rows.lock().unwrap();
        self.insert_checked(&mut rows, request)
    }

    async fn get_by_id(&self, id: Self::Id) -> DbResult<Option<Self::Response>> {
        Ok(self.stored(id))
    }

    async fn list(&self, filter: &Self::Filter) -> DbResult<(Vec<Self::Response>, i64)> {
        let mut matching: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|c| filter.user_id.is_none_or(|u| c.user_id == u))
            .filter(|c| contains_ci(&c.brand, &filter.brand))
            .filter(|c| filter.is_available.is_none_or(|a| c.is_available == a))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ord = match filter.sort_by {
                CarSortField::Brand => a.brand.cmp(&b.brand),
                CarSortField::Model => a.model.cmp(&b.model),
                CarSortField::Year => a.year.cmp(&b.year),
                CarSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            }
            .then(a.id.cmp(&b.id));
            match filter.sort_dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        });

        let total = matching.len() as i64;
        Ok((page_of(matching, filter.page.limit(), filter.page.offset()), total))
    }

    async fn update(&self, id: Self::Id, request: &Self::UpdateRequest) -> DbResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        if rows.values().any(|c| c.license_plate == request.license_plate && c.id != id) {
            return Err(plate_conflict());
        }
        let car = rows.get_mut(&id).ok_or(DbError::NotFound)?;
        car.brand = request.brand.clone();
        car.model = request.model.clone();
        car.year = request.year;
        car.color = request.color.clone();
        car.license_plate = request.license_plate.clone();
        car.is_available = request.is_available;
        car.updated_at = touch(car.updated_at);
        Ok(1)
    }

    async fn delete(&self, id: Self::Id) -> DbResult<u64> {
        self.rows.lock().unwrap().remove(&id).map(|_| 1).ok_or(DbError::NotFound)
    }
}

#[async_trait::async_trait]
impl CarStore for InMemoryCars {
    async fn create_bulk(&self, requests: &[CarCreateDBRequest]) -> DbResult<Vec<CarDBResponse>> {
        let mut rows = self.rows.lock().unwrap();
        // Work on a copy so a failure part way through leaves nothing behind
        let mut staged = rows.clone();
        let mut created = Vec::with_capacity(requests.len());
        for request in requests {
            created.push(self.insert_checked(&mut staged, request)?);
        }
        *rows = staged;
        Ok(created)
    }

    async fn transfer(&self, id: CarId, new_owner: UserId) -> DbResult<u64> {
        self.check_owner(new_owner)?;
        let mut rows = self.rows.lock().unwrap();
        let car = rows.get_mut(&id).ok_or(DbError::NotFound)?;
        car.user_id = new_owner;
        car.updated_at = touch(car.updated_at);
        Ok(1)
    }

    async fn set_availability(&self, ids: &[CarId], is_available: bool) -> DbResult<Vec<CarId>> {
        let mut rows = self.rows.lock().unwrap();
        let mut updated = Vec::new();
        for id in ids {
            if let Some(car) = rows.get_mut(id) {
                car.is_available = is_available;
                car.updated_at = touch(car.updated_at);
                updated.push(*id);
            }
        }
        Ok(updated)
    }
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: crate::config::DatabaseConfig {
            url: "postgres://unused/in-memory".to_string(),
            ..Default::default()
        },
        limits: crate::config::LimitsConfig {
            rate_limiter: crate::config::RateLimiterConfig {
                enabled: false,
                ..Default::default()
            },
        },
        ..Default::default()
    }
}

/// Services wired to in-memory repositories and `cache`.
pub fn create_test_state(config: Config, cache: Arc<MemoryCache>) -> AppState {
    let gate = if config.cache.enabled {
        CacheGate::new(cache.clone(), config.cache.ttl)
    } else {
        CacheGate::disabled()
    };

    let user_repo = Arc::new(InMemoryUsers::default());
    let car_repo = Arc::new(InMemoryCars::new(user_repo.clone()));
    let users = UserService::new(user_repo, gate.clone());
    let cars = CarService::new(car_repo, users.clone(), gate);

    let limiter = config
        .limits
        .rate_limiter
        .enabled
        .then(|| RateLimiter::from_config(&config.limits.rate_limiter, cache))
        .transpose()
        .expect("valid rate limiter config");

    AppState::builder().config(config).users(users).cars(cars).maybe_limiter(limiter).build()
}

/// Full router on in-memory state; returns the cache so tests can inspect it.
pub fn create_test_app(config: Config) -> (TestServer, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::default());
    let state = create_test_state(config, cache.clone());
    let router = crate::build_router(state).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, cache)
}
