//! Input validation for user-supplied text.
//!
//! Each field kind is checked against a compiled pattern; failures surface
//! as [`Error::Validation`] naming the offending field.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// A compiled field pattern.
#[derive(Debug)]
struct FieldPattern {
    /// Field name used in error messages.
    field: &'static str,
    /// What a valid value looks like, for error messages.
    expected: &'static str,
    regex: Regex,
}

impl FieldPattern {
    fn new(field: &'static str, expected: &'static str, pattern: &str) -> Self {
        Self {
            field,
            expected,
            regex: Regex::new(pattern).expect("invalid field pattern"),
        }
    }

    fn check(&self, value: &str) -> Result<()> {
        if self.regex.is_match(value) {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "{} '{value}' is not valid: expected {}",
                self.field, self.expected
            )))
        }
    }
}

static EMAIL: LazyLock<FieldPattern> = LazyLock::new(|| {
    FieldPattern::new(
        "email",
        "an address like name@example.org",
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$",
    )
});

static PHONE: LazyLock<FieldPattern> = LazyLock::new(|| {
    FieldPattern::new(
        "phone",
        "7 to 15 digits, optionally with +, spaces, dashes or parentheses",
        r"^\+?[0-9(][0-9 ()-]{5,18}[0-9]$",
    )
});

static NAME: LazyLock<FieldPattern> = LazyLock::new(|| {
    FieldPattern::new(
        "name",
        "1 to 100 letters, spaces, dots, apostrophes or dashes",
        r"^[\p{L}][\p{L} .'-]{0,99}$",
    )
});

static ORGANISATION: LazyLock<FieldPattern> = LazyLock::new(|| {
    FieldPattern::new(
        "hospital name",
        "1 to 120 letters, digits or punctuation",
        r"^[\p{L}\p{N}][\p{L}\p{N} .,&'()/-]{0,119}$",
    )
});

static FILE_NAME: LazyLock<FieldPattern> = LazyLock::new(|| {
    FieldPattern::new(
        "file name",
        "a plain name with an extension and no path",
        r"^[A-Za-z0-9][A-Za-z0-9 ._-]{0,200}\.[A-Za-z0-9]{1,8}$",
    )
});

static BLOOD_PRESSURE: LazyLock<FieldPattern> = LazyLock::new(|| {
    FieldPattern::new(
        "blood pressure",
        "systolic/diastolic such as 120/80",
        r"^[0-9]{2,3}/[0-9]{2,3}$",
    )
});

/// Validate an e-mail address.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the address is malformed.
pub fn validate_email(value: &str) -> Result<()> {
    EMAIL.check(value)
}

/// Validate a phone number.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the number is malformed.
pub fn validate_phone(value: &str) -> Result<()> {
    let digits = value.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digits) {
        return Err(Error::validation(format!(
            "phone '{value}' must contain 7 to 15 digits"
        )));
    }
    PHONE.check(value)
}

/// Validate a person's name.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the name is empty or has odd characters.
pub fn validate_name(value: &str) -> Result<()> {
    NAME.check(value.trim())
}

/// Validate a hospital or organisation name.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the name is empty or has odd characters.
pub fn validate_organisation(value: &str) -> Result<()> {
    ORGANISATION.check(value.trim())
}

/// Validate an upload's file name and return its lowercase extension.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the name contains a path or no extension.
pub fn validate_file_name(value: &str) -> Result<String> {
    FILE_NAME.check(value)?;
    value
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .ok_or_else(|| Error::validation(format!("file name '{value}' has no extension")))
}

/// Validate a blood pressure reading.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the reading is not `systolic/diastolic`.
pub fn validate_blood_pressure(value: &str) -> Result<()> {
    BLOOD_PRESSURE.check(value)
}
