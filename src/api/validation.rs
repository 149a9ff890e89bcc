//! Input validation for API requests.
//!
//! Each `validate_*` function returns a user-facing message on failure. Handlers
//! collect them per field with `ValidationErrorBuilder::check`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .unwrap();

    /// Local or international numbers, optionally grouped with spaces or dashes
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9][0-9 \-]{9,19}$").unwrap();
}

/// Maximum length of short text columns
pub const MAX_TEXT_LEN: usize = 255;

/// Descriptions and notes (`VARCHAR(2000)`)
pub const MAX_LONG_TEXT_LEN: usize = 2000;

/// Street addresses (`VARCHAR(500)`)
pub const MAX_ADDRESS_LEN: usize = 500;

/// Trimmed value, `None` when absent or blank
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Value of a nullable update field when it is set to something non-blank
pub fn non_blank_nullable(value: &Option<Option<String>>) -> Option<&str> {
    value.as_ref().and_then(non_blank)
}

/// Trimmed owned value, `None` when absent or blank
pub fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Same as [`clean`] for nullable update fields; blank clears the column
pub fn clean_nullable(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(clean)
}

/// Validate a required name-like field
pub fn validate_name(value: Option<&str>, label: &str) -> Result<(), String> {
    let Some(value) = value else {
        return Err(format!("{} is required", label));
    };
    if value.chars().count() < 2 {
        return Err(format!("{} must be at least 2 characters", label));
    }
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(format!(
            "{} is too long (max {} characters)",
            label, MAX_TEXT_LEN
        ));
    }
    Ok(())
}

/// Optional free text bounded by its column width
pub fn validate_text(value: &str, label: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("{} is too long (max {} characters)", label, max));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.len() > MAX_TEXT_LEN {
        return Err("Email is too long".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), String> {
    if !PHONE_REGEX.is_match(phone) {
        return Err("Phone number must be at least 10 digits".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    // bcrypt only looks at the first 72 bytes
    if password.len() > 72 {
        return Err("Password is too long (max 72 bytes)".to_string());
    }
    Ok(())
}

pub fn validate_rating(rating: f64) -> Result<(), String> {
    if !(0.0..=5.0).contains(&rating) {
        return Err("Rating must be between 0 and 5".to_string());
    }
    Ok(())
}

/// Money amounts and rates
pub fn validate_amount(amount: f64, label: &str) -> Result<(), String> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(format!("{} must be a non-negative number", label));
    }
    Ok(())
}

pub fn validate_experience(years: i64) -> Result<(), String> {
    if !(0..=80).contains(&years) {
        return Err("Experience must be between 0 and 80 years".to_string());
    }
    Ok(())
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` or a bare `YYYY-MM-DD`
pub fn validate_schedule_date(date: &str) -> Result<(), String> {
    let valid = DateTime::parse_from_rfc3339(date).is_ok()
        || NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok();
    if valid {
        Ok(())
    } else {
        Err("Scheduled date must be a date (YYYY-MM-DD) or date-time".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("admin@mazdoor.pk").is_ok());
        assert!(validate_email("first.last+tag@mail.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("user@localhost").is_err());
        assert!(validate_email("user@@example.com").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("03001234567").is_ok());
        assert!(validate_phone("+92 300 1234567").is_ok());
        assert!(validate_phone("0300-1234567").is_ok());

        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("phone-number").is_err());
        assert!(validate_phone("-3001234567").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name(Some("Plumbing"), "Name").is_ok());
        assert_eq!(validate_name(None, "Name").unwrap_err(), "Name is required");
        assert!(validate_name(Some("A"), "Name").is_err());
        assert!(validate_name(Some(&"x".repeat(256)), "Name").is_err());
    }

    #[test]
    fn test_non_blank_trims() {
        assert_eq!(non_blank(&Some("  Lahore ".to_string())), Some("Lahore"));
        assert_eq!(non_blank(&Some("   ".to_string())), None);
        assert_eq!(non_blank(&None), None);
        assert_eq!(clean_nullable(Some(Some(" ".to_string()))), Some(None));
    }

    #[test]
    fn test_validate_text_counts_characters() {
        let urdu = "ب".repeat(MAX_LONG_TEXT_LEN);
        assert!(validate_text(&urdu, "Description", MAX_LONG_TEXT_LEN).is_ok());
        assert!(validate_text(&format!("{}x", urdu), "Description", MAX_LONG_TEXT_LEN).is_err());
        assert!(validate_text(&"a".repeat(501), "Address", MAX_ADDRESS_LEN).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("correct horse").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"p".repeat(73)).is_err());
    }

    #[test]
    fn test_validate_numbers() {
        assert!(validate_rating(4.5).is_ok());
        assert!(validate_rating(5.1).is_err());
        assert!(validate_rating(-0.1).is_err());
        assert!(validate_amount(0.0, "Amount").is_ok());
        assert!(validate_amount(-1.0, "Amount").is_err());
        assert!(validate_amount(f64::NAN, "Amount").is_err());
        assert!(validate_experience(81).is_err());
    }

    #[test]
    fn test_validate_schedule_date() {
        assert!(validate_schedule_date("2024-06-01").is_ok());
        assert!(validate_schedule_date("2024-06-01T09:30").is_ok());
        assert!(validate_schedule_date("2024-06-01T09:30:00").is_ok());
        assert!(validate_schedule_date("2024-06-01T09:30:00+05:00").is_ok());
        assert!(validate_schedule_date("2024-06-01T09:30:00.000Z").is_ok());

        assert!(validate_schedule_date("tomorrow").is_err());
        assert!(validate_schedule_date("2024-13-01").is_err());
        assert!(validate_schedule_date("").is_err());
    }
}
