//! ABO/Rh blood groups and red-cell compatibility.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One of the eight ABO/Rh blood groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BloodGroup {
    /// A, Rh positive.
    #[serde(rename = "A+")]
    APos,
    /// A, Rh negative.
    #[serde(rename = "A-")]
    ANeg,
    /// B, Rh positive.
    #[serde(rename = "B+")]
    BPos,
    /// B, Rh negative.
    #[serde(rename = "B-")]
    BNeg,
    /// AB, Rh positive.
    #[serde(rename = "AB+")]
    AbPos,
    /// AB, Rh negative.
    #[serde(rename = "AB-")]
    AbNeg,
    /// O, Rh positive.
    #[serde(rename = "O+")]
    OPos,
    /// O, Rh negative.
    #[serde(rename = "O-")]
    ONeg,
}

impl BloodGroup {
    /// Every group, in display order.
    pub const ALL: [BloodGroup; 8] = [
        Self::APos,
        Self::ANeg,
        Self::BPos,
        Self::BNeg,
        Self::AbPos,
        Self::AbNeg,
        Self::OPos,
        Self::ONeg,
    ];

    /// Canonical label, e.g. `AB-`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::APos => "A+",
            Self::ANeg => "A-",
            Self::BPos => "B+",
            Self::BNeg => "B-",
            Self::AbPos => "AB+",
            Self::AbNeg => "AB-",
            Self::OPos => "O+",
            Self::ONeg => "O-",
        }
    }

    /// Whether the group carries the RhD antigen.
    #[must_use]
    pub fn is_rh_positive(self) -> bool {
        matches!(self, Self::APos | Self::BPos | Self::AbPos | Self::OPos)
    }

    fn has_a(self) -> bool {
        matches!(self, Self::APos | Self::ANeg | Self::AbPos | Self::AbNeg)
    }

    fn has_b(self) -> bool {
        matches!(self, Self::BPos | Self::BNeg | Self::AbPos | Self::AbNeg)
    }

    /// Whether red cells of this group can be given to `recipient`.
    ///
    /// The recipient must carry every antigen the donor carries.
    #[must_use]
    pub fn can_donate_to(self, recipient: BloodGroup) -> bool {
        (!self.has_a() || recipient.has_a())
            && (!self.has_b() || recipient.has_b())
            && (!self.is_rh_positive() || recipient.is_rh_positive())
    }

    /// All donor groups compatible with `recipient`.
    #[must_use]
    pub fn donors_for(recipient: BloodGroup) -> Vec<BloodGroup> {
        Self::ALL
            .into_iter()
            .filter(|donor| donor.can_donate_to(recipient))
            .collect()
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodGroup {
    type Err = Error;

    /// Accepts `A+`, `a+`, `A_POS`, `a pos`, `ab-neg` and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || Error::validation(format!("unknown blood group: '{s}'"));

        let upper = s.trim().to_ascii_uppercase();
        let split = upper
            .find(|c: char| !matches!(c, 'A' | 'B' | 'O'))
            .ok_or_else(unknown)?;
        let (abo, rest) = upper.split_at(split);

        let rest = rest.trim_matches(|c: char| c == ' ' || c == '_');
        let positive = match rest {
            "+" => true,
            "-" => false,
            word => match word.trim_start_matches('-').trim_start() {
                "POS" | "POSITIVE" => true,
                "NEG" | "NEGATIVE" => false,
                _ => return Err(unknown()),
            },
        };

        match (abo, positive) {
            ("A", true) => Ok(Self::APos),
            ("A", false) => Ok(Self::ANeg),
            ("B", true) => Ok(Self::BPos),
            ("B", false) => Ok(Self::BNeg),
            ("AB", true) => Ok(Self::AbPos),
            ("AB", false) => Ok(Self::AbNeg),
            ("O", true) => Ok(Self::OPos),
            ("O", false) => Ok(Self::ONeg),
            _ => Err(unknown()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(BloodGroup::AbNeg.to_string(), "AB-");
        assert_eq!(BloodGroup::OPos.to_string(), "O+");
    }

    #[test]
    fn test_parse_spellings() {
        assert_eq!("A+".parse::<BloodGroup>().unwrap(), BloodGroup::APos);
        assert_eq!(" o- ".parse::<BloodGroup>().unwrap(), BloodGroup::ONeg);
        assert_eq!("ab_pos".parse::<BloodGroup>().unwrap(), BloodGroup::AbPos);
        assert_eq!("B NEG".parse::<BloodGroup>().unwrap(), BloodGroup::BNeg);
        assert_eq!("ab-neg".parse::<BloodGroup>().unwrap(), BloodGroup::AbNeg);
        assert_eq!("O positive".parse::<BloodGroup>().unwrap(), BloodGroup::OPos);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("C+".parse::<BloodGroup>().is_err());
        assert!("".parse::<BloodGroup>().is_err());
        assert!("A".parse::<BloodGroup>().is_err());
    }

    #[test]
    fn test_universal_donor_and_recipient() {
        for group in BloodGroup::ALL {
            assert!(BloodGroup::ONeg.can_donate_to(group));
            assert!(group.can_donate_to(BloodGroup::AbPos));
        }
    }

    #[test]
    fn test_rh_positive_cannot_give_to_negative() {
        assert!(!BloodGroup::OPos.can_donate_to(BloodGroup::ONeg));
        assert!(!BloodGroup::APos.can_donate_to(BloodGroup::ANeg));
        assert!(BloodGroup::ANeg.can_donate_to(BloodGroup::APos));
    }

    #[test]
    fn test_abo_incompatibility() {
        assert!(!BloodGroup::APos.can_donate_to(BloodGroup::BPos));
        assert!(!BloodGroup::AbNeg.can_donate_to(BloodGroup::ANeg));
        assert!(BloodGroup::BNeg.can_donate_to(BloodGroup::AbNeg));
    }

    #[test]
    fn test_donors_for() {
        let donors = BloodGroup::donors_for(BloodGroup::ONeg);
        assert_eq!(donors, vec![BloodGroup::ONeg]);

        let donors = BloodGroup::donors_for(BloodGroup::AbPos);
        assert_eq!(donors.len(), 8);

        let donors = BloodGroup::donors_for(BloodGroup::ANeg);
        assert_eq!(donors, vec![BloodGroup::ANeg, BloodGroup::ONeg]);
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&BloodGroup::AbPos).unwrap();
        assert_eq!(json, "\"AB+\"");
        let parsed: BloodGroup = serde_json::from_str("\"O-\"").unwrap();
        assert_eq!(parsed, BloodGroup::ONeg);
    }
}
