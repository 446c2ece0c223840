use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppError;

pub const MAX_NAME_LENGTH: usize = 128;
pub const MAX_EMAIL_LENGTH: usize = 255;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Email validation
pub fn is_valid_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= MAX_EMAIL_LENGTH && EMAIL_RE.is_match(email)
}

/// Accumulates per-field problems so a request reports all of them at once.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: BTreeMap<String, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_string()).or_insert_with(|| message.into());
    }

    /// Required, non-blank, bounded name
    pub fn check_name(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, format!("{} cannot be empty", field));
        } else if value.chars().count() > MAX_NAME_LENGTH {
            self.add(
                field,
                format!("{} cannot be longer than {} characters", field, MAX_NAME_LENGTH),
            );
        }
    }

    pub fn check_optional_name(&mut self, field: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.check_name(field, value);
        }
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            return Ok(());
        }

        let message = self
            .errors
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect::<Vec<_>>()
            .join("; ");

        Err(AppError::Validation {
            message,
            field_errors: self.errors,
        })
    }
}
