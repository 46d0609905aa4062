//! Database models for users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::models::pagination::PageRequest;
use crate::api::models::users::{UserCreate, UserUpdate};
use crate::db::models::SortDir;
use crate::db::queries::SqlIdent;
use crate::types::UserId;

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub name: String,
    pub email: String,
    pub age: i32,
    pub is_active: bool,
}

impl From<UserCreate> for UserCreateDBRequest {
    fn from(api: UserCreate) -> Self {
        Self {
            name: api.name,
            email: api.email,
            age: api.age,
            is_active: true,
        }
    }
}

/// Full replacement row for an update, produced by merging a patch onto the stored user
#[derive(Debug, Clone, PartialEq)]
pub struct UserUpdateDBRequest {
    pub name: String,
    pub email: String,
    pub age: i32,
    pub is_active: bool,
}

impl UserUpdateDBRequest {
    /// Overlay the fields present in `patch` onto `existing`.
    pub fn merge(existing: &UserDBResponse, patch: UserUpdate) -> Self {
        Self {
            name: patch.name.unwrap_or_else(|| existing.name.clone()),
            email: patch.email.unwrap_or_else(|| existing.email.clone()),
            age: patch.age.unwrap_or(existing.age),
            is_active: patch.is_active.unwrap_or(existing.is_active),
        }
    }
}

/// Database response for a user. Also the cached representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub age: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns a user list may be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserSortField {
    Name,
    Email,
    Age,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl UserSortField {
    /// Unknown names fall back to `created_at`.
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(str::to_ascii_lowercase).as_deref() {
            Some("name") => Self::Name,
            Some("email") => Self::Email,
            Some("age") => Self::Age,
            Some("updated_at") => Self::UpdatedAt,
            _ => Self::CreatedAt,
        }
    }
}

impl SqlIdent for UserSortField {
    fn sql_ident(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Age => "age",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

/// Filter for listing users
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    /// Case-insensitive substring of the email
    pub email: Option<String>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub page: PageRequest,
    pub sort_by: UserSortField,
    pub sort_dir: SortDir,
}
