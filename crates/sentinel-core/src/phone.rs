//! Emergency-contact phone numbers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SentinelError};

/// Minimum number of digits accepted for an emergency contact
pub const MIN_PHONE_DIGITS: usize = 10;

/// A phone number as entered by the user, with separators removed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse user input, stripping whitespace, hyphens and parentheses.
    ///
    /// A single leading `+` is allowed; everything else must be a digit and
    /// there must be at least [`MIN_PHONE_DIGITS`] of them.
    pub fn parse(input: &str) -> Result<Self> {
        let compact: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
            .collect();

        let digits = compact.strip_prefix('+').unwrap_or(&compact);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(SentinelError::InvalidPhoneNumber(input.to_string()));
        }
        if digits.len() < MIN_PHONE_DIGITS {
            return Err(SentinelError::InvalidPhoneNumber(format!(
                "{input}: need at least {MIN_PHONE_DIGITS} digits"
            )));
        }

        Ok(Self(compact))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_country_code(&self) -> bool {
        self.0.starts_with('+')
    }

    /// International form: numbers without `+` get `+{country_code}`,
    /// replacing a leading trunk `0`.
    pub fn to_international(&self, country_code: &str) -> String {
        if self.has_country_code() {
            return self.0.clone();
        }
        let national = self.0.strip_prefix('0').unwrap_or(&self.0);
        format!("+{country_code}{national}")
    }

    /// International digits without the `+`, as used in `wa.me` links
    pub fn wa_digits(&self, country_code: &str) -> String {
        self.to_international(country_code).replacen('+', "", 1)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = SentinelError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}
