//! Database models for cars.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::models::cars::{CarCreate, CarUpdate};
use crate::api::models::pagination::PageRequest;
use crate::db::models::SortDir;
use crate::db::queries::SqlIdent;
use crate::types::{CarId, UserId};

/// Database request for creating a new car
#[derive(Debug, Clone)]
pub struct CarCreateDBRequest {
    pub user_id: UserId,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub color: Option<String>,
    pub license_plate: String,
    pub is_available: bool,
}

impl From<CarCreate> for CarCreateDBRequest {
    fn from(api: CarCreate) -> Self {
        Self {
            user_id: api.user_id,
            brand: api.brand,
            model: api.model,
            year: api.year,
            color: api.color,
            license_plate: api.license_plate,
            is_available: true,
        }
    }
}

/// Full replacement row for an update, produced by merging a patch onto the stored car
#[derive(Debug, Clone, PartialEq)]
pub struct CarUpdateDBRequest {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub color: Option<String>,
    pub license_plate: String,
    pub is_available: bool,
}

impl CarUpdateDBRequest {
    /// Overlay the fields present in `patch` onto `existing`.
    pub fn merge(existing: &CarDBResponse, patch: CarUpdate) -> Self {
        Self {
            brand: patch.brand.unwrap_or_else(|| existing.brand.clone()),
            model: patch.model.unwrap_or_else(|| existing.model.clone()),
            year: patch.year.unwrap_or(existing.year),
            color: patch.color.or_else(|| existing.color.clone()),
            license_plate: patch.license_plate.unwrap_or_else(|| existing.license_plate.clone()),
            is_available: patch.is_available.unwrap_or(existing.is_available),
        }
    }
}

/// Database response for a car. Also the cached representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CarDBResponse {
    pub id: CarId,
    pub user_id: UserId,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub color: Option<String>,
    pub license_plate: String,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns a car list may be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CarSortField {
    Brand,
    Model,
    Year,
    #[default]
    CreatedAt,
}

impl CarSortField {
    /// Unknown names fall back to `created_at`.
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(str::to_ascii_lowercase).as_deref() {
            Some("brand") => Self::Brand,
            Some("model") => Self::Model,
            Some("year") => Self::Year,
            _ => Self::CreatedAt,
        }
    }
}

impl SqlIdent for CarSortField {
    fn sql_ident(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Model => "model",
            Self::Year => "year",
            Self::CreatedAt => "created_at",
        }
    }
}

/// Filter for listing cars
#[derive(Debug, Clone, Default)]
pub struct CarFilter {
    /// Restrict to one owner
    pub user_id: Option<UserId>,
    /// Case-insensitive substring of the brand
    pub brand: Option<String>,
    pub is_available: Option<bool>,
    pub page: PageRequest,
    pub sort_by: CarSortField,
    pub sort_dir: SortDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overlays_present_fields() {
        let now = Utc::now();
        let existing = CarDBResponse {
            id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
            brand: "Toyota".into(),
            model: "Corolla".into(),
            year: 2019,
            color: Some("red".into()),
            license_plate: "B 1234 XY".into(),
            is_available: true,
            created_at: now,
            updated_at: now,
        };

        let merged = CarUpdateDBRequest::merge(
            &existing,
            CarUpdate {
                model: Some("Camry".into()),
                is_available: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(merged.brand, "Toyota");
        assert_eq!(merged.model, "Camry");
        assert_eq!(merged.color.as_deref(), Some("red"));
        assert!(!merged.is_available);
    }

    #[test]
    fn test_sort_field_fallback() {
        assert_eq!(CarSortField::from_param(Some("year")), CarSortField::Year);
        assert_eq!(CarSortField::from_param(Some("license_plate")), CarSortField::CreatedAt);
    }
}
