//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: User identifier
//! - [`CarId`]: Car identifier
//!
//! [`abbrev_uuid`] shortens UUIDs to their first 8 chars for logging.

use uuid::Uuid;

pub type UserId = Uuid;
pub type CarId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
