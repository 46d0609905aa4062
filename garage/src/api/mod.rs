//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures, the response envelope and pagination
//!
//! # API Structure
//!
//! Everything lives under `/api/v1`:
//!
//! - **Users** (`/api/v1/users/*`): user CRUD and the cars a user owns
//! - **Cars** (`/api/v1/cars/*`): car CRUD, bulk create, ownership transfer, availability
//!
//! The OpenAPI document is served at `/api-docs/openapi.json` and rendered at `/docs`.

pub mod handlers;
pub mod models;
