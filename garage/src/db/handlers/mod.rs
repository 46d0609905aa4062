//! Repository implementations for database access.

pub mod cars;
pub mod repository;
pub mod users;

pub use cars::{CarStore, Cars};
pub use repository::Repository;
pub use users::{UserStore, Users};
