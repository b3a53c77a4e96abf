//! Field-level input validation.
//!
//! Rules other than `required` skip absent or blank values, so optional
//! fields are only checked when the client actually sends them. Failures are
//! collected per field and rendered with human readable field names
//! (`first_name` becomes `First Name`).

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Date layouts accepted by [`Validator::date`].
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Validation failures keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// The first message recorded, in field order.
    pub fn first_message(&self) -> Option<&str> {
        self.0.values().flatten().next().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.first_message() {
            Some(message) => f.write_str(message),
            None => f.write_str("no validation errors"),
        }
    }
}

impl std::error::Error for ValidationErrors {}

/// Accumulates rule failures for a request payload.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors.add(field, message);
        self
    }

    pub fn required(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if is_blank(value) {
            let message = render("The :field field is required.", field);
            self.errors.add(field, message);
        }
        self
    }

    /// `required` for non-text values such as numbers.
    pub fn present<T>(&mut self, field: &str, value: Option<T>) -> &mut Self {
        if value.is_none() {
            let message = render("The :field field is required.", field);
            self.errors.add(field, message);
        }
        self
    }

    /// Fails when a value is present but blank. Used by partial updates.
    pub fn not_blank(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if matches!(value, Some(v) if v.trim().is_empty()) {
            let message = render("The :field field cannot be empty.", field);
            self.errors.add(field, message);
        }
        self
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = present(value) {
            if !is_valid_email(v) {
                let message = render("The :field field must be a valid email address.", field);
                self.errors.add(field, message);
            }
        }
        self
    }

    pub fn min_len(&mut self, field: &str, value: Option<&str>, min: usize) -> &mut Self {
        if let Some(v) = present(value) {
            if v.chars().count() < min {
                let message = render("The :field field must be at least :min characters.", field)
                    .replace(":min", &min.to_string());
                self.errors.add(field, message);
            }
        }
        self
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) -> &mut Self {
        if let Some(v) = present(value) {
            if v.chars().count() > max {
                let message =
                    render("The :field field may not be greater than :max characters.", field)
                        .replace(":max", &max.to_string());
                self.errors.add(field, message);
            }
        }
        self
    }

    pub fn between(&mut self, field: &str, value: Option<i64>, min: i64, max: i64) -> &mut Self {
        if let Some(v) = value {
            if v < min || v > max {
                let message = render("The :field field must be between :min and :max.", field)
                    .replace(":min", &min.to_string())
                    .replace(":max", &max.to_string());
                self.errors.add(field, message);
            }
        }
        self
    }

    pub fn date(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = present(value) {
            if parse_flexible_date(v).is_none() {
                let message = render("The :field field must be a valid date.", field);
                self.errors.add(field, message);
            }
        }
        self
    }

    pub fn one_of(&mut self, field: &str, value: Option<&str>, allowed: &[&str]) -> &mut Self {
        if let Some(v) = present(value) {
            if !allowed.contains(&v) {
                let message = render("The selected :field is invalid.", field);
                self.errors.add(field, message);
            }
        }
        self
    }

    /// Checks `value` against its `<field>_confirmation` counterpart.
    pub fn confirmed(
        &mut self,
        field: &str,
        value: Option<&str>,
        confirmation: Option<&str>,
    ) -> &mut Self {
        if value != confirmation {
            let message = render("The :field field confirmation does not match.", field);
            self.errors.add(field, message);
        }
        self
    }

    pub fn phone(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = present(value) {
            if !is_valid_phone(v) {
                let message = render("The :field field format is invalid.", field);
                self.errors.add(field, message);
            }
        }
        self
    }

    pub fn sa_id(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = present(value) {
            if !is_valid_sa_id(v) {
                let message = render("The :field field format is invalid.", field);
                self.errors.add(field, message);
            }
        }
        self
    }

    /// Records one message per missing password trait.
    pub fn password_strength(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = present(value) {
            for message in password_weaknesses(v) {
                self.errors.add(field, message);
            }
        }
        self
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// `first_name` -> `First Name`.
pub fn field_display_name(field: &str) -> String {
    field
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render(template: &str, field: &str) -> String {
    template.replace(":field", &field_display_name(field))
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Trims a submitted string, mapping blank input to `None`.
pub fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty() && !l.starts_with('-'))
}

/// Ten to fifteen digits once punctuation and spaces are removed.
pub fn is_valid_phone(value: &str) -> bool {
    let digits = value.chars().filter(char::is_ascii_digit).count();
    (10..=15).contains(&digits)
}

/// South African identity number: thirteen digits with a Luhn check digit.
pub fn is_valid_sa_id(value: &str) -> bool {
    let id: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if id.len() != 13 || !id.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = id.chars().filter_map(|c| c.to_digit(10)).collect();
    let sum: u32 = digits[..12]
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 0 {
                d
            } else {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            }
        })
        .sum();
    (10 - sum % 10) % 10 == digits[12]
}

pub fn password_weaknesses(value: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    if value.chars().count() < 8 {
        problems.push("Password must be at least 8 characters long");
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        problems.push("Password must contain at least one uppercase letter");
    }
    if !value.chars().any(|c| c.is_ascii_lowercase()) {
        problems.push("Password must contain at least one lowercase letter");
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain at least one number");
    }
    problems
}

/// Parses any of the accepted date layouts. The value must format back to
/// exactly the submitted text, so `2026-1-5` is rejected.
pub fn parse_flexible_date(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT) {
        if dt.format(DATETIME_FORMAT).to_string() == value {
            return Some(dt.date());
        }
    }
    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(value, format)
            .ok()
            .filter(|d| d.format(format).to_string() == value)
    })
}

/// Strict `YYYY-MM-DD`.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()
        .filter(|d| d.format("%Y-%m-%d").to_string() == value.trim())
}

/// Interprets the loose truthy values HTML forms and JSON clients send.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_are_title_cased() {
        assert_eq!(field_display_name("first_name"), "First Name");
        assert_eq!(field_display_name("email"), "Email");
        assert_eq!(field_display_name("password_confirmation"), "Password Confirmation");
    }

    #[test]
    fn required_treats_whitespace_as_missing() {
        let mut v = Validator::new();
        v.required("title", Some("   ")).required("description", None);
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.get("title").unwrap(), ["The Title field is required."]);
        assert_eq!(
            errors.get("description").unwrap(),
            ["The Description field is required."]
        );
    }

    #[test]
    fn optional_rules_skip_absent_values() {
        let mut v = Validator::new();
        v.email("email", None)
            .min_len("password", Some(""), 8)
            .phone("phone", None)
            .date("date_of_birth", Some("  "));
        assert!(v.finish().is_ok());
    }

    #[test]
    fn length_messages_carry_bounds() {
        let mut v = Validator::new();
        v.min_len("password", Some("abc"), 8).max_len("username", Some("abcdef"), 3);
        let errors = v.finish().unwrap_err();
        assert_eq!(
            errors.get("password").unwrap(),
            ["The Password field must be at least 8 characters."]
        );
        assert_eq!(
            errors.get("username").unwrap(),
            ["The Username field may not be greater than 3 characters."]
        );
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("learner@clubhouse.org.za"));
        assert!(!is_valid_email("learner@localhost"));
        assert!(!is_valid_email("no-at-sign.example.com"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaced out@example.com"));
    }

    #[test]
    fn phone_counts_digits_only() {
        assert!(is_valid_phone("+27 (11) 555-0123"));
        assert!(!is_valid_phone("555-0123"));
        assert!(!is_valid_phone("1234567890123456"));
    }

    #[test]
    fn sa_id_checks_luhn_digit() {
        assert!(is_valid_sa_id("8001015009087"));
        assert!(is_valid_sa_id("800101 5009 087"));
        assert!(!is_valid_sa_id("8001015009088"));
        assert!(!is_valid_sa_id("80010150090"));
    }

    #[test]
    fn password_strength_reports_each_gap() {
        let problems = password_weaknesses("abc");
        assert_eq!(problems.len(), 3);
        assert!(problems.contains(&"Password must contain at least one uppercase letter"));
        assert!(password_weaknesses("Sup3rSecret").is_empty());
    }

    #[test]
    fn flexible_dates_require_exact_layout() {
        assert_eq!(
            parse_flexible_date("2026-01-05"),
            NaiveDate::from_ymd_opt(2026, 1, 5)
        );
        assert_eq!(
            parse_flexible_date("2026-01-05 08:30:00"),
            NaiveDate::from_ymd_opt(2026, 1, 5)
        );
        assert!(parse_flexible_date("12/25/2026").is_some());
        assert!(parse_flexible_date("2026-1-5").is_none());
        assert!(parse_flexible_date("2026-02-30").is_none());
        assert!(parse_iso_date("05/01/2026").is_none());
    }

    #[test]
    fn confirmation_and_membership() {
        let mut v = Validator::new();
        v.confirmed("password", Some("Secret123"), Some("Secret124"))
            .one_of("user_type", Some("wizard"), &["admin", "member"]);
        let errors = v.finish().unwrap_err();
        assert!(errors.has("password"));
        assert_eq!(errors.get("user_type").unwrap(), ["The selected User Type is invalid."]);
    }

    #[test]
    fn flags_and_cleaning() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(clean(Some("  hi ".into())), Some("hi".to_string()));
        assert_eq!(clean(Some("   ".into())), None);
    }
}
