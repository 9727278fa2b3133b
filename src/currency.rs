//! Supported account currencies
//!
//! Amounts everywhere in the ledger are `i64` minor units of one of these
//! currencies. Codes are exact 3-letter uppercase ISO-like strings; anything
//! else is rejected at the boundary so that no amount is ever interpreted in
//! the wrong unit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CurrencyError {
    #[error("Currency code must be 3 characters: got '{0}'")]
    InvalidLength(String),

    #[error("Currency code must be uppercase: got '{got}', expected '{expected}'")]
    NotUppercase { got: String, expected: String },

    #[error("Unsupported currency: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    Usd,
    Etb,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Usd, Currency::Etb];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Etb => "ETB",
        }
    }

    /// Parse a currency code.
    ///
    /// # Examples
    /// ```
    /// use payledger::currency::Currency;
    ///
    /// assert_eq!(Currency::parse("ETB").unwrap(), Currency::Etb);
    /// assert!(Currency::parse("etb").is_err());
    /// assert!(Currency::parse("EUR").is_err());
    /// ```
    pub fn parse(code: &str) -> Result<Self, CurrencyError> {
        let code = code.trim();

        if code.chars().count() != 3 {
            return Err(CurrencyError::InvalidLength(code.to_string()));
        }

        let expected = code.to_uppercase();
        if code != expected {
            return Err(CurrencyError::NotUppercase {
                got: code.to_string(),
                expected,
            });
        }

        match code {
            "USD" => Ok(Currency::Usd),
            "ETB" => Ok(Currency::Etb),
            other => Err(CurrencyError::Unsupported(other.to_string())),
        }
    }

    pub fn is_supported(code: &str) -> bool {
        Self::parse(code).is_ok()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.as_str().to_string()
    }
}
