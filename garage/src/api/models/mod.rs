//! API request and response data models.
//!
//! API models are distinct from database models so the wire contract can evolve
//! independently of the storage representation. All models are annotated with `utoipa` for
//! the generated OpenAPI document.
//!
//! - [`users`], [`cars`]: resource payloads, list queries and their validation
//! - [`pagination`]: page parameters and the pagination block of list responses
//! - [`envelope`]: the `{meta, data, pagination}` wrapper around every response

pub mod cars;
pub mod envelope;
pub mod pagination;
pub mod users;
pub mod validation;
