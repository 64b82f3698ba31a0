//! Donor profiles and eligibility.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::BloodGroup;
use crate::config::DonationConfig;

/// A person registered to give blood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donor {
    /// Row id.
    pub id: i64,
    /// Account that owns this profile, if the donor registered online.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Full name.
    pub name: String,
    /// Contact e-mail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact phone number.
    pub phone: String,
    /// ABO/Rh group.
    pub blood_group: BloodGroup,
    /// Date of birth.
    pub date_of_birth: NaiveDate,
    /// Body weight in kilograms.
    pub weight_kg: f64,
    /// Home city.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Day of the last completed donation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_donation_on: Option<NaiveDate>,
    /// Whether the donor is willing to be contacted.
    pub is_available: bool,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    /// Whether the donor may donate on the checked day.
    pub eligible: bool,
    /// First day the waiting period allows another donation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_eligible_on: Option<NaiveDate>,
    /// Why the donor is not eligible; empty when eligible.
    pub reasons: Vec<String>,
}

impl Donor {
    /// Age in whole years on `today`.
    #[must_use]
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        today.years_since(self.date_of_birth).unwrap_or(0)
    }

    /// First day after `last_donation_on` that clears the waiting period.
    #[must_use]
    pub fn next_eligible_on(&self, policy: &DonationConfig) -> Option<NaiveDate> {
        self.last_donation_on.and_then(|last| {
            last.checked_add_days(Days::new(u64::from(policy.waiting_period_days)))
        })
    }

    /// Check every eligibility rule for a donation on `day`.
    #[must_use]
    pub fn eligibility(&self, day: NaiveDate, policy: &DonationConfig) -> Eligibility {
        let mut reasons = Vec::new();

        let age = self.age_on(day);
        if age < policy.min_age_years {
            reasons.push(format!(
                "donor is {age}, minimum age is {}",
                policy.min_age_years
            ));
        } else if age > policy.max_age_years {
            reasons.push(format!(
                "donor is {age}, maximum age is {}",
                policy.max_age_years
            ));
        }

        if self.weight_kg < policy.min_weight_kg {
            reasons.push(format!(
                "weight {:.1} kg is below the minimum of {:.1} kg",
                self.weight_kg, policy.min_weight_kg
            ));
        }

        let next_eligible_on = self.next_eligible_on(policy);
        if let Some(next) = next_eligible_on {
            if day < next {
                reasons.push(format!("waiting period runs until {next}"));
            }
        }

        if !self.is_available {
            reasons.push("donor is marked unavailable".to_string());
        }

        Eligibility {
            eligible: reasons.is_empty(),
            next_eligible_on,
            reasons,
        }
    }
}

/// Input for registering a donor.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDonor {
    /// Owning account, set by the service for self-registration.
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Full name.
    pub name: String,
    /// Contact e-mail.
    #[serde(default)]
    pub email: Option<String>,
    /// Contact phone number.
    pub phone: String,
    /// ABO/Rh group.
    pub blood_group: BloodGroup,
    /// Date of birth.
    pub date_of_birth: NaiveDate,
    /// Body weight in kilograms.
    pub weight_kg: f64,
    /// Home city.
    #[serde(default)]
    pub city: Option<String>,
    /// Day of a donation made before registration.
    #[serde(default)]
    pub last_donation_on: Option<NaiveDate>,
}

/// Partial update of a donor profile; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonorUpdate {
    /// New name.
    pub name: Option<String>,
    /// New e-mail.
    pub email: Option<String>,
    /// New phone number.
    pub phone: Option<String>,
    /// New weight.
    pub weight_kg: Option<f64>,
    /// New city.
    pub city: Option<String>,
    /// New availability.
    pub is_available: Option<bool>,
}

/// Filters for listing donors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonorFilter {
    /// Only donors of this group.
    pub blood_group: Option<BloodGroup>,
    /// Only donors with this availability flag.
    pub available: Option<bool>,
    /// Only donors eligible on this day.
    pub eligible_on: Option<NaiveDate>,
    /// Only donors in this city (case-insensitive).
    pub city: Option<String>,
}
