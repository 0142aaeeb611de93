//! Domain aggregates and shared value types.
//!
//! The Client and Project aggregates exclusively own their embedded
//! collections (documents, notes, team members, tasks, milestones). Mutation
//! goes through accessor methods that enforce invariants and recompute
//! derived fields; raw containers are never handed out mutably.

pub mod client;
pub mod project;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;

/// Supported billing currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
    Jpy,
    Inr,
    Cny,
}

impl Currency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Cad => "CAD",
            Self::Aud => "AUD",
            Self::Jpy => "JPY",
            Self::Inr => "INR",
            Self::Cny => "CNY",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "USD" => Some(Self::Usd),
            "EUR" => Some(Self::Eur),
            "GBP" => Some(Self::Gbp),
            "CAD" => Some(Self::Cad),
            "AUD" => Some(Self::Aud),
            "JPY" => Some(Self::Jpy),
            "INR" => Some(Self::Inr),
            "CNY" => Some(Self::Cny),
            _ => None,
        }
    }
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").expect("email pattern compiles")
});

static CLIENT_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{2,20}$").expect("client code pattern compiles"));

pub(crate) fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

pub(crate) fn is_valid_client_code(value: &str) -> bool {
    CLIENT_CODE_RE.is_match(value)
}

/// Check a required string length range, collecting a field error otherwise.
pub(crate) fn check_len(
    errors: &mut ValidationErrors,
    field: &str,
    value: &str,
    min: usize,
    max: usize,
) {
    let len = value.trim().chars().count();
    if len < min {
        errors.push(field, format!("must be at least {min} characters"));
    } else if len > max {
        errors.push(field, format!("cannot be more than {max} characters"));
    }
}

/// Check an optional string's maximum length.
pub(crate) fn check_opt_len(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) {
    if let Some(value) = value
        && value.chars().count() > max
    {
        errors.push(field, format!("cannot be more than {max} characters"));
    }
}

pub(crate) fn check_opt_email(errors: &mut ValidationErrors, field: &str, value: Option<&str>) {
    if let Some(value) = value
        && !value.is_empty()
        && !is_valid_email(value)
    {
        errors.push(field, "must be a valid email address");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_round_trips_through_db_values() {
        for raw in ["USD", "EUR", "GBP", "CAD", "AUD", "JPY", "INR", "CNY"] {
            let currency = Currency::from_db_value(raw).expect("supported currency");
            assert_eq!(currency.as_str(), raw);
        }
        assert_eq!(Currency::from_db_value("CHF"), None);
    }

    #[test]
    fn currency_serializes_as_iso_code() {
        assert_eq!(serde_json::to_string(&Currency::Usd).unwrap(), "\"USD\"");
        assert_eq!(
            serde_json::from_str::<Currency>("\"EUR\"").unwrap(),
            Currency::Eur
        );
    }

    #[test]
    fn email_pattern_accepts_basic_addresses() {
        assert!(is_valid_email("ops@example.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[test]
    fn client_code_pattern_is_strict() {
        assert!(is_valid_client_code("ACME01"));
        assert!(is_valid_client_code("AB"));
        assert!(!is_valid_client_code("A"));
        assert!(!is_valid_client_code("acme01"));
        assert!(!is_valid_client_code("ACME-01"));
        assert!(!is_valid_client_code("A".repeat(21).as_str()));
    }
}
