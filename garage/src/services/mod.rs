//! Entity services: the layer between HTTP handlers and repositories.
//!
//! Services own the read-through cache and the merge-patch update flow:
//!
//! ```text
//! fetch (store) -> merge patch -> persist -> invalidate cache -> refetch (store) -> cache
//! ```
//!
//! The refetch reads the store directly and overwrites the cache entry, so the caller sees the
//! committed row (including `updated_at`) even when the invalidation could not reach Redis.

pub mod cars;
pub mod users;

pub use cars::CarService;
pub use users::UserService;

use crate::db::errors::DbError;
use crate::errors::Error;
use uuid::Uuid;

fn not_found(resource: &'static str, id: Uuid) -> Error {
    Error::NotFound {
        resource: resource.to_string(),
        id: id.to_string(),
    }
}

/// Map a repository `NotFound` onto the resource-specific API error.
fn or_not_found(resource: &'static str, id: Uuid) -> impl FnOnce(DbError) -> Error {
    move |err| match err {
        DbError::NotFound => not_found(resource, id),
        other => Error::Database(other),
    }
}
