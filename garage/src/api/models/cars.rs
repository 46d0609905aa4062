//! API request/response models for cars.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

use super::pagination::PageParams;
use super::validation;
use crate::db::models::SortDir;
use crate::db::models::cars::{CarCreateDBRequest, CarDBResponse, CarFilter, CarSortField};
use crate::errors::{Error, Result};
use crate::types::{CarId, UserId};

/// Maximum number of cars in one bulk create.
pub const MAX_BULK_CARS: usize = 50;

/// Maximum number of cars in one availability update.
pub const MAX_AVAILABILITY_IDS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CarCreate {
    /// Owner
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub brand: String,
    pub model: String,
    /// 1900 to 2100
    pub year: i32,
    pub color: Option<String>,
    pub license_plate: String,
}

fn validate_car_fields(brand: &str, model: &str, year: i32, color: Option<&str>, license_plate: &str) -> Result<()> {
    validation::length("brand", brand, 2, 100)?;
    validation::length("model", model, 2, 100)?;
    validation::range("year", year, 1900, 2100)?;
    if let Some(color) = color {
        validation::max_length("color", color, 50)?;
    }
    validation::length("license_plate", license_plate, 3, 20)
}

impl CarCreate {
    pub fn validate(&self) -> Result<()> {
        validate_car_fields(&self.brand, &self.model, self.year, self.color.as_deref(), &self.license_plate)
    }
}

/// One car of a bulk create; the owner is given once for the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CarBulkItem {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub color: Option<String>,
    pub license_plate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CarBulkCreate {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// 1 to 50 cars
    pub cars: Vec<CarBulkItem>,
}

impl CarBulkCreate {
    pub fn validate(&self) -> Result<()> {
        validation::count("cars", self.cars.len(), 1, MAX_BULK_CARS)?;
        for (i, car) in self.cars.iter().enumerate() {
            validate_car_fields(&car.brand, &car.model, car.year, car.color.as_deref(), &car.license_plate).map_err(|e| {
                Error::BadRequest {
                    message: format!("cars[{i}]: {e}"),
                }
            })?;
        }
        Ok(())
    }

    pub fn into_requests(self) -> Vec<CarCreateDBRequest> {
        let user_id = self.user_id;
        self.cars
            .into_iter()
            .map(|car| CarCreateDBRequest {
                user_id,
                brand: car.brand,
                model: car.model,
                year: car.year,
                color: car.color,
                license_plate: car.license_plate,
                is_available: true,
            })
            .collect()
    }
}

/// Merge-patch body: absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CarUpdate {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub license_plate: Option<String>,
    pub is_available: Option<bool>,
}

impl CarUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(brand) = &self.brand {
            validation::length("brand", brand, 2, 100)?;
        }
        if let Some(model) = &self.model {
            validation::length("model", model, 2, 100)?;
        }
        if let Some(year) = self.year {
            validation::range("year", year, 1900, 2100)?;
        }
        if let Some(color) = &self.color {
            validation::max_length("color", color, 50)?;
        }
        if let Some(plate) = &self.license_plate {
            validation::length("license_plate", plate, 3, 20)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CarTransfer {
    #[schema(value_type = String, format = "uuid")]
    pub new_user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CarAvailabilityUpdate {
    /// 1 to 100 car ids
    #[schema(value_type = Vec<String>)]
    pub car_ids: Vec<CarId>,
    pub is_available: bool,
}

impl CarAvailabilityUpdate {
    pub fn validate(&self) -> Result<()> {
        validation::count("car_ids", self.car_ids.len(), 1, MAX_AVAILABILITY_IDS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CarAvailabilityResponse {
    /// Cars that existed and were updated
    #[schema(value_type = Vec<String>)]
    pub updated_ids: Vec<CarId>,
    pub updated_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CarResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CarId,
    #[schema(value_type = String, format = "uuid")]
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

impl From<CarDBResponse> for CarResponse {
    fn from(db: CarDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            brand: db.brand,
            model: db.model,
            year: db.year,
            color: db.color,
            license_plate: db.license_plate,
            is_available: db.is_available,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Query parameters for listing cars
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListCarsQuery {
    /// Pagination parameters
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: PageParams,

    /// Only cars owned by this user
    #[schema(value_type = Option<String>, format = "uuid")]
    #[param(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,

    /// Case-insensitive substring of the brand
    pub brand: Option<String>,

    #[serde_as(as = "Option<DisplayFromStr>")]
    pub is_available: Option<bool>,

    /// One of brand, model, year, created_at (default: created_at)
    pub sort_by: Option<String>,

    /// asc or desc (default: asc)
    pub sort_dir: Option<String>,
}

impl ListCarsQuery {
    pub fn into_filter(self) -> Result<CarFilter> {
        let sort_dir = match self.sort_dir.as_deref() {
            Some(dir) => dir.parse::<SortDir>().map_err(|message| Error::BadRequest { message })?,
            None => SortDir::default(),
        };

        Ok(CarFilter {
            user_id: self.user_id,
            brand: self.brand.filter(|s| !s.is_empty()),
            is_available: self.is_available,
            page: self.pagination.request(),
            sort_by: CarSortField::from_param(self.sort_by.as_deref()),
            sort_dir,
        })
    }
}
