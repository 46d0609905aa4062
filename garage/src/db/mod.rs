//! Database layer for data persistence and access.
//!
//! ```text
//! ┌─────────────┐
//! │  Services   │  (merge-patch, cache orchestration)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - resolve named queries, map rows)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  Queries    │  (db::queries - named, templated SQL)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! Repositories hold the shared [`sqlx::PgPool`] rather than a borrowed connection, so a
//! service can keep one behind an `Arc<dyn ...>` for the lifetime of the process. Statements
//! that must be atomic (bulk car creation) open their own transaction.

pub mod errors;
pub mod handlers;
pub mod models;
pub mod queries;
