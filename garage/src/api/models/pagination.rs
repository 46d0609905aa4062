//! Page-number pagination shared by all list endpoints.
//!
//! Requests carry `page` (1-based) and `page_size`; responses carry a [`Pagination`] block
//! describing where the returned slice sits in the full result set.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Default number of items to return per page.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Maximum number of items that can be requested per page.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination query parameters.
///
/// `page` below 1 is treated as 1. A `page_size` outside `1..=100` falls back to the
/// default of 10 rather than being clamped to the nearest bound.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct PageParams {
    /// Page number, starting at 1 (default: 1)
    #[param(default = 1, minimum = 1)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page: Option<i64>,

    /// Items per page (default: 10, max: 100)
    #[param(default = 10, minimum = 1, maximum = 100)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page_size: Option<i64>,
}

impl PageParams {
    #[inline]
    pub fn page(&self) -> i64 {
        self.request().page
    }

    #[inline]
    pub fn page_size(&self) -> i64 {
        self.request().page_size
    }

    #[inline]
    pub fn offset(&self) -> i64 {
        self.request().offset()
    }

    pub fn request(&self) -> PageRequest {
        PageRequest::clamped(self.page, self.page_size)
    }
}

/// A page position after clamping, as handed to the repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::clamped(None, None)
    }
}

impl PageRequest {
    pub fn clamped(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page_size = match page_size {
            Some(size) if (1..=MAX_PAGE_SIZE).contains(&size) => size,
            _ => DEFAULT_PAGE_SIZE,
        };
        Self {
            page: page.unwrap_or(1).max(1),
            page_size,
        }
    }

    #[inline]
    pub fn limit(&self) -> i64 {
        self.page_size
    }

    #[inline]
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Position of a returned page within the full result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub current_page: i64,
    pub page_size: i64,
    pub current_elements: i64,
    pub total_pages: i64,
    pub total_elements: i64,
    pub sort_by: String,
}

impl Pagination {
    /// `total_pages` is `ceil(total_elements / page_size)`, and never less than 1.
    pub fn compute(total_elements: i64, page: i64, page_size: i64, current_elements: i64, sort_by: impl Into<String>) -> Self {
        let page_size = page_size.max(1);
        let total_elements = total_elements.max(0);
        let mut total_pages = total_elements / page_size;
        if total_elements % page_size > 0 || total_elements == 0 {
            total_pages += 1;
        }

        Self {
            current_page: page,
            page_size,
            current_elements,
            total_pages,
            total_elements,
            sort_by: sort_by.into(),
        }
    }
}
