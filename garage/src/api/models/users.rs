//! API request/response models for users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

use super::pagination::PageParams;
use super::validation;
use crate::db::models::SortDir;
use crate::db::models::users::{UserDBResponse, UserFilter, UserSortField};
use crate::errors::{Error, Result};
use crate::types::UserId;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserCreate {
    /// 2 to 100 characters
    pub name: String,
    pub email: String,
    /// 1 to 150
    pub age: i32,
}

impl UserCreate {
    pub fn validate(&self) -> Result<()> {
        validation::length("name", &self.name, 2, 100)?;
        validation::email("email", &self.email)?;
        validation::range("age", self.age, 1, 150)
    }
}

/// Merge-patch body: absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i32>,
    pub is_active: Option<bool>,
}

impl UserUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validation::length("name", name, 2, 100)?;
        }
        if let Some(email) = &self.email {
            validation::email("email", email)?;
        }
        if let Some(age) = self.age {
            validation::range("age", age, 1, 150)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub age: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            email: db.email,
            age: db.age,
            is_active: db.is_active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Query parameters for listing users
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListUsersQuery {
    /// Pagination parameters
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: PageParams,

    /// Case-insensitive substring of the name
    pub name: Option<String>,

    /// Case-insensitive substring of the email
    pub email: Option<String>,

    #[serde_as(as = "Option<DisplayFromStr>")]
    pub min_age: Option<i32>,

    #[serde_as(as = "Option<DisplayFromStr>")]
    pub max_age: Option<i32>,

    /// One of name, email, age, created_at, updated_at (default: created_at)
    pub sort_by: Option<String>,

    /// asc or desc (default: asc)
    pub sort_dir: Option<String>,
}

impl ListUsersQuery {
    pub fn into_filter(self) -> Result<UserFilter> {
        let sort_dir = match self.sort_dir.as_deref() {
            Some(dir) => dir.parse::<SortDir>().map_err(|message| Error::BadRequest { message })?,
            None => SortDir::default(),
        };

        Ok(UserFilter {
            name: self.name.filter(|s| !s.is_empty()),
            email: self.email.filter(|s| !s.is_empty()),
            min_age: self.min_age,
            max_age: self.max_age,
            page: self.pagination.request(),
            sort_by: UserSortField::from_param(self.sort_by.as_deref()),
            sort_dir,
        })
    }
}
