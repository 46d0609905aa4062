//! Base repository trait for database operations.

use crate::db::errors::Result;

/// Base repository trait providing common database operations.
///
/// This trait has separate associated types for create requests, update requests, and
/// responses. Methods take `&self` so implementations can be shared behind an `Arc<dyn ...>`.
///
/// Writes report the number of affected rows; zero rows is [`DbError::NotFound`], never
/// `Ok(0)`.
///
/// [`DbError::NotFound`]: crate::db::errors::DbError::NotFound
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// The request type for creating entities
    type CreateRequest: Send + Sync;

    /// The request type for updating entities
    type UpdateRequest: Send + Sync;

    /// The response/DTO type returned by operations
    type Response: Send;

    /// The identifier type for lookups
    type Id: Send + Sync;

    /// The filter type for list operations
    type Filter: Send + Sync;

    /// Create a new entity
    async fn create(&self, request: &Self::CreateRequest) -> Result<Self::Response>;

    /// Get an entity by ID
    async fn get_by_id(&self, id: Self::Id) -> Result<Option<Self::Response>>;

    /// One page of entities matching the filter, plus the total number of matches.
    ///
    /// The page and the count are separate reads and may observe different snapshots.
    async fn list(&self, filter: &Self::Filter) -> Result<(Vec<Self::Response>, i64)>;

    /// Update an entity by ID
    async fn update(&self, id: Self::Id, request: &Self::UpdateRequest) -> Result<u64>;

    /// Delete an entity by ID
    async fn delete(&self, id: Self::Id) -> Result<u64>;
}

/// Map a zero-row write to `NotFound`.
pub(crate) fn affected(rows: u64) -> Result<u64> {
    if rows == 0 {
        Err(crate::db::errors::DbError::NotFound)
    } else {
        Ok(rows)
    }
}
