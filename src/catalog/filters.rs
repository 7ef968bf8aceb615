//! Listing filters and pagination metadata.

use serde::Serialize;
use thiserror::Error;

use crate::validation::{permitted_value, Validator};

pub const MAX_PAGE: u64 = 10_000_000;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Sort keys accepted for movie listings.
pub const MOVIE_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Raised when a sort key reaches the store without passing validation
    #[error("Unsafe sort parameter: {0}")]
    UnsafeSort(String),
}

/// Paging and ordering requested by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: u64,
    pub page_size: u64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    pub fn new(sort_safelist: &'static [&'static str]) -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort: "id".to_string(),
            sort_safelist,
        }
    }

    pub fn validate(&self, v: &mut Validator) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(self.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
        v.check(
            permitted_value(&self.sort.as_str(), self.sort_safelist),
            "sort",
            "invalid sort value",
        );
    }

    /// Column named by the sort key, without its direction prefix.
    pub fn sort_column(&self) -> Result<&str, FilterError> {
        if !permitted_value(&self.sort.as_str(), self.sort_safelist) {
            return Err(FilterError::UnsafeSort(self.sort.clone()));
        }
        Ok(self.sort.trim_start_matches('-'))
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) * self.page_size) as usize
    }
}

/// Pagination details returned alongside a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: u64,
}

impl Metadata {
    /// An empty result set yields empty metadata.
    pub fn calculate(total_records: u64, page: u64, page_size: u64) -> Self {
        if total_records == 0 || page_size == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: total_records.div_ceil(page_size),
            total_records,
        }
    }
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}
