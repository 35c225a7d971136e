// src/pipeline/filter.rs

//! Inclusion and exclusion rules.
//!
//! Every rule must hold for a record to pass. A non-empty inclusion list
//! fails closed: a record without the attribute cannot be confirmed to match.

use std::fmt;

use crate::models::{FilterConfig, Restaurant};

/// Why a record was kept or dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Pass,
    ExcludedLicenseType(String),
    WardNotIncluded(Option<u32>),
    ZipNotIncluded(Option<String>),
}

impl FilterVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, FilterVerdict::Pass)
    }
}

impl fmt::Display for FilterVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterVerdict::Pass => write!(f, "passes all filters"),
            FilterVerdict::ExcludedLicenseType(t) => write!(f, "license type '{t}' is excluded"),
            FilterVerdict::WardNotIncluded(Some(w)) => write!(f, "ward {w} is not included"),
            FilterVerdict::WardNotIncluded(None) => write!(f, "ward is unknown"),
            FilterVerdict::ZipNotIncluded(Some(z)) => write!(f, "zip code {z} is not included"),
            FilterVerdict::ZipNotIncluded(None) => write!(f, "zip code is unknown"),
        }
    }
}

/// Evaluate the filter rules against a record.
pub fn evaluate(restaurant: &Restaurant, filters: &FilterConfig) -> FilterVerdict {
    let license = restaurant.license_type.trim();
    if filters
        .excluded_license_types
        .iter()
        .any(|t| t.trim() == license)
    {
        return FilterVerdict::ExcludedLicenseType(license.to_string());
    }

    if !filters.included_wards.is_empty() {
        match restaurant.ward {
            Some(ward) if filters.included_wards.contains(&ward) => {}
            other => return FilterVerdict::WardNotIncluded(other),
        }
    }

    if !filters.included_zip_codes.is_empty() {
        let zip = restaurant.zip_code.as_deref().map(str::trim);
        match zip {
            Some(z) if filters.included_zip_codes.iter().any(|i| i.trim() == z) => {}
            other => return FilterVerdict::ZipNotIncluded(other.map(str::to_string)),
        }
    }

    FilterVerdict::Pass
}

/// Whether a record passes every configured rule.
pub fn passes(restaurant: &Restaurant, filters: &FilterConfig) -> bool {
    evaluate(restaurant, filters).passed()
}
