use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use shared_models::error::AppError;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for FieldError {}

impl From<FieldError> for AppError {
    fn from(err: FieldError) -> Self {
        AppError::Validation {
            field: err.field,
            message: err.message,
        }
    }
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

pub fn min_chars(field: &str, value: &str, min: usize, message: &str) -> Result<(), FieldError> {
    if value.trim().chars().count() < min {
        return Err(FieldError::new(field, message));
    }
    Ok(())
}

pub fn email(field: &str, value: &str) -> Result<(), FieldError> {
    let value = value.trim();
    let valid = match email_regex() {
        Some(re) => re.is_match(value),
        None => value.contains('@'),
    };
    if !valid {
        return Err(FieldError::new(field, "Invalid email address"));
    }
    Ok(())
}

pub fn phone_digits(field: &str, value: &str, min_digits: usize, message: &str) -> Result<(), FieldError> {
    let digits = value.chars().filter(char::is_ascii_digit).count();
    if digits < min_digits {
        return Err(FieldError::new(field, message));
    }
    Ok(())
}

/// Treats absent, blank and whitespace-only strings alike.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(email("email", "front.desk@clinic.in").is_ok());
        assert!(email("email", "not-an-email").is_err());
        assert!(email("email", "a b@c.d").is_err());
    }

    #[test]
    fn test_phone_digits_ignores_separators() {
        assert!(phone_digits("phone", "+91 98765-43210", 10, "too short").is_ok());
        let err = phone_digits("phone", "12345", 10, "too short").unwrap_err();
        assert_eq!(err, FieldError::new("phone", "too short"));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(Some(" x ".to_string())), Some("x".to_string()));
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_min_chars() {
        assert!(min_chars("name", "A", 2, "short").is_err());
        assert!(min_chars("name", "Al", 2, "short").is_ok());
    }
}
