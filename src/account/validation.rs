//! Input validation for account owners
//!
//! The owner is the authenticated principal name handed in by the transport
//! layer. Fields are private to force validation through `OwnerName::new()`.

use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Validated owner name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerName(String);

impl OwnerName {
    pub const MAX_LEN: usize = 64;

    /// Create a new validated OwnerName
    ///
    /// # Validation Rules
    /// - Surrounding whitespace is trimmed
    /// - Length: 1-64 bytes
    /// - Characters: ASCII letters, digits and `_ - . @`
    ///
    /// # Examples
    /// ```
    /// use payledger::account::validation::OwnerName;
    ///
    /// let alice = OwnerName::new(" alice ").unwrap();
    /// assert_eq!(alice.as_str(), "alice");
    ///
    /// assert!(OwnerName::new("").is_err());
    /// assert!(OwnerName::new("bob smith").is_err());
    /// ```
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();

        if name.is_empty() || name.len() > Self::MAX_LEN {
            return Err(ValidationError::InvalidLength {
                field: "owner",
                min: 1,
                max: Self::MAX_LEN,
                actual: name.len(),
            });
        }

        let valid = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'));
        if !valid {
            return Err(ValidationError::InvalidFormat {
                field: "owner",
                value: name.to_string(),
                expected: "ASCII letters, digits, '_', '-', '.', '@'",
            });
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OwnerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
