//! Donor profiles and eligibility.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use super::BloodBank;
use crate::error::{Error, Result};
use crate::model::{Donor, DonorFilter, DonorUpdate, Eligibility, NewDonor, Role};
use crate::validation::{validate_email, validate_name, validate_phone};

fn validate_weight(weight_kg: f64, min_weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 || weight_kg > 400.0 {
        return Err(Error::validation(format!(
            "weight {weight_kg} kg is not a plausible body weight"
        )));
    }
    if weight_kg < min_weight_kg {
        return Err(Error::validation(format!(
            "weight {weight_kg:.1} kg is below the minimum of {min_weight_kg:.1} kg"
        )));
    }
    Ok(())
}

impl BloodBank {
    /// Register a donor profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for bad contact data or a donor outside
    /// the age and weight limits, and [`Error::Conflict`] if the linked
    /// account already has a profile.
    pub fn register_donor(&self, new: &NewDonor, now: DateTime<Utc>) -> Result<Donor> {
        let policy = &self.config.donation;
        let today = now.date_naive();

        validate_name(&new.name)?;
        validate_phone(&new.phone)?;
        if let Some(email) = &new.email {
            validate_email(email)?;
        }
        validate_weight(new.weight_kg, policy.min_weight_kg)?;

        let age = today.years_since(new.date_of_birth).ok_or_else(|| {
            Error::validation(format!(
                "date of birth {} is in the future",
                new.date_of_birth
            ))
        })?;
        if !(policy.min_age_years..=policy.max_age_years).contains(&age) {
            return Err(Error::validation(format!(
                "donors must be {} to {} years old, got {age}",
                policy.min_age_years, policy.max_age_years
            )));
        }
        if new.last_donation_on.is_some_and(|day| day > today) {
            return Err(Error::validation("last donation date is in the future"));
        }

        if let Some(user_id) = new.user_id {
            let user = self.get_user(user_id)?;
            if user.role != Role::Donor {
                return Err(Error::validation(format!(
                    "user {user_id} is a {} account, not a donor account",
                    user.role
                )));
            }
        }

        let id = self.storage.insert_donor(new, now)?;
        info!(donor_id = id, blood_group = %new.blood_group, "Registered donor");
        self.get_donor(id)
    }

    /// Apply a partial update to a donor profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the donor does not exist or
    /// [`Error::Validation`] for bad values.
    pub fn update_donor(&self, id: i64, patch: &DonorUpdate) -> Result<Donor> {
        let mut donor = self.get_donor(id)?;

        if let Some(name) = &patch.name {
            validate_name(name)?;
            donor.name = name.trim().to_string();
        }
        if let Some(email) = &patch.email {
            validate_email(email)?;
            donor.email = Some(email.clone());
        }
        if let Some(phone) = &patch.phone {
            validate_phone(phone)?;
            donor.phone = phone.clone();
        }
        if let Some(weight_kg) = patch.weight_kg {
            validate_weight(weight_kg, 0.0)?;
            donor.weight_kg = weight_kg;
        }
        if let Some(city) = &patch.city {
            donor.city = Some(city.trim().to_string()).filter(|c| !c.is_empty());
        }
        if let Some(is_available) = patch.is_available {
            donor.is_available = is_available;
        }

        self.storage.update_donor(&donor)?;
        Ok(donor)
    }

    /// Mark a donor available or unavailable for solicitation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the donor does not exist.
    pub fn set_availability(&self, id: i64, is_available: bool) -> Result<Donor> {
        self.update_donor(
            id,
            &DonorUpdate {
                is_available: Some(is_available),
                ..DonorUpdate::default()
            },
        )
    }

    /// Get a donor by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the donor does not exist.
    pub fn get_donor(&self, id: i64) -> Result<Donor> {
        self.storage
            .get_donor(id)?
            .ok_or_else(|| Error::not_found("donor", id))
    }

    /// Get the donor profile linked to an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the account has no donor profile.
    pub fn donor_for_user(&self, user_id: i64) -> Result<Donor> {
        self.storage
            .get_donor_by_user(user_id)?
            .ok_or_else(|| Error::not_found("donor profile for user", user_id))
    }

    /// List donors. With `eligible_on` set only donors eligible that day remain.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_donors(&self, filter: &DonorFilter) -> Result<Vec<Donor>> {
        let donors = self.storage.list_donors(
            filter.blood_group,
            filter.available,
            filter.city.as_deref(),
        )?;
        Ok(match filter.eligible_on {
            Some(day) => donors
                .into_iter()
                .filter(|d| d.eligibility(day, &self.config.donation).eligible)
                .collect(),
            None => donors,
        })
    }

    /// Whether a donor may give blood on `day`, and why not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the donor does not exist.
    pub fn eligibility(&self, id: i64, day: NaiveDate) -> Result<Eligibility> {
        Ok(self.get_donor(id)?.eligibility(day, &self.config.donation))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::BloodGroup;

    #[test]
    fn test_register_and_get() {
        let bank = bank();
        let donor = donor(&bank, "Ann Lee", BloodGroup::ONeg);

        assert_eq!(bank.get_donor(donor.id).unwrap(), donor);
        assert!(donor.is_available);
        assert!(bank.get_donor(donor.id + 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_register_rejects_out_of_policy_donors() {
        let bank = bank();

        let mut young = new_donor("Young One", BloodGroup::APos);
        young.date_of_birth = date(2010, 1, 1);
        assert!(matches!(
            bank.register_donor(&young, at(2024, 1, 1)),
            Err(Error::Validation(_))
        ));

        let mut light = new_donor("Light One", BloodGroup::APos);
        light.weight_kg = 45.0;
        assert!(bank.register_donor(&light, at(2024, 1, 1)).is_err());

        let mut bad_phone = new_donor("Phone Less", BloodGroup::APos);
        bad_phone.phone = "n/a".to_string();
        assert!(bank.register_donor(&bad_phone, at(2024, 1, 1)).is_err());

        let mut future = new_donor("Time Traveller", BloodGroup::APos);
        future.last_donation_on = Some(date(2024, 6, 1));
        assert!(bank.register_donor(&future, at(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_profile_must_link_donor_account() {
        let bank = bank();
        let admin = admin(&bank);

        let mut profile = new_donor("Ada Admin", BloodGroup::APos);
        profile.user_id = Some(admin.id);
        assert!(matches!(
            bank.register_donor(&profile, at(2024, 1, 1)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_one_profile_per_account() {
        let bank = bank();
        let (user, donor) = donor_account(&bank, "dana@example.org", BloodGroup::BPos);
        assert_eq!(bank.donor_for_user(user.id).unwrap().id, donor.id);

        let mut again = new_donor("Dana Donor", BloodGroup::BPos);
        again.user_id = Some(user.id);
        assert!(matches!(
            bank.register_donor(&again, at(2024, 1, 1)),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_update_and_availability() {
        let bank = bank();
        let donor = donor(&bank, "Ann Lee", BloodGroup::ONeg);

        let updated = bank
            .update_donor(
                donor.id,
                &DonorUpdate {
                    phone: Some("+1 555 010 0199".to_string()),
                    city: Some("York".to_string()),
                    ..DonorUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.city.as_deref(), Some("York"));

        let off = bank.set_availability(donor.id, false).unwrap();
        assert!(!off.is_available);
        assert!(!bank.eligibility(donor.id, date(2024, 2, 1)).unwrap().eligible);

        assert!(bank
            .update_donor(
                donor.id,
                &DonorUpdate {
                    email: Some("bad".to_string()),
                    ..DonorUpdate::default()
                }
            )
            .is_err());
    }

    #[test]
    fn test_list_filters_by_eligibility() {
        let bank = bank();
        let fresh = donor(&bank, "Fresh Donor", BloodGroup::APos);
        let mut recent = new_donor("Recent Donor", BloodGroup::APos);
        recent.last_donation_on = Some(date(2023, 12, 20));
        bank.register_donor(&recent, at(2024, 1, 1)).unwrap();

        let all = bank.list_donors(&DonorFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let eligible = bank
            .list_donors(&DonorFilter {
                eligible_on: Some(date(2024, 1, 10)),
                ..DonorFilter::default()
            })
            .unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, fresh.id);

        let later = bank
            .list_donors(&DonorFilter {
                eligible_on: Some(date(2024, 3, 20)),
                ..DonorFilter::default()
            })
            .unwrap();
        assert_eq!(later.len(), 2);
    }
}
