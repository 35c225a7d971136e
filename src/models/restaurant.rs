//! Restaurant license record.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One retail food license application fetched from the data portal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Restaurant {
    /// Legal business name
    pub name: String,

    /// Street address
    pub address: String,

    /// City ward, when the portal knows it
    pub ward: Option<u32>,

    /// Five digit zip code
    pub zip_code: Option<String>,

    /// Free-text description of what the business does
    pub business_activity: Option<String>,

    /// Floor area in square feet
    pub square_footage: Option<f64>,

    /// License description, e.g. "Retail Food Establishment"
    pub license_type: String,

    /// When the application was created; drives the cursor
    pub application_date: NaiveDateTime,
}

/// Identity of a record within one fetched batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub name: String,
    pub address: String,
    pub application_date: NaiveDateTime,
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {} ({})",
            self.name,
            self.address,
            self.application_date.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

impl Restaurant {
    /// Natural key used to drop duplicates inside a batch.
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            name: self.name.clone(),
            address: self.address.clone(),
            application_date: self.application_date,
        }
    }

    /// Ordering used for posting: date first, then name and address so ties stay stable.
    pub fn cmp_for_posting(&self, other: &Self) -> std::cmp::Ordering {
        self.application_date
            .cmp(&other.application_date)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.address.cmp(&other.address))
    }

    /// Example record shown by the preview command when the portal has nothing new.
    pub fn sample(application_date: NaiveDateTime) -> Self {
        Self {
            name: "Chicago Deep Dish Paradise".to_string(),
            address: "123 W Madison St".to_string(),
            ward: Some(42),
            zip_code: Some("60601".to_string()),
            business_activity: Some("Restaurant with bar and outdoor patio".to_string()),
            square_footage: Some(2500.0),
            license_type: "Retail Food Establishment".to_string(),
            application_date,
        }
    }
}
