//! Request validation.
//!
//! Each validator checks every field and reports all problems at once, so a
//! client can fix a form in one round trip.

use thiserror::Error;

use crate::models::AnalysisType;

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const NAME_CHARS: (usize, usize) = (2, 50);
pub const ADDRESS_CHARS: (usize, usize) = (10, 500);
pub const MAX_NOTES_CHARS: usize = 2000;
pub const MIN_SEARCH_CHARS: usize = 3;

/// One or more human-readable field problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .0.join("; "))]
pub struct ValidationErrors(pub Vec<String>);

#[derive(Debug, Default)]
struct Checks(Vec<String>);

impl Checks {
    fn require(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.0.push(message.into());
        }
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.0))
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Pragmatic address check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

fn check_email(checks: &mut Checks, email: &str) {
    if email.trim().is_empty() {
        checks.require(false, "Email is required");
    } else {
        checks.require(is_valid_email(email.trim()), "Invalid email address");
    }
}

fn check_name(checks: &mut Checks, value: Option<&str>, label: &str) {
    if let Some(value) = value {
        let len = char_len(value.trim());
        checks.require(
            len >= NAME_CHARS.0,
            format!("{} must be at least {} characters", label, NAME_CHARS.0),
        );
        checks.require(
            len <= NAME_CHARS.1,
            format!("{} cannot exceed {} characters", label, NAME_CHARS.1),
        );
    }
}

pub fn validate_registration(
    email: &str,
    password: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Result<(), ValidationErrors> {
    let mut checks = Checks::default();
    check_email(&mut checks, email);
    if password.is_empty() {
        checks.require(false, "Password is required");
    } else {
        checks.require(
            char_len(password) >= MIN_PASSWORD_CHARS,
            format!("Password must be at least {} characters", MIN_PASSWORD_CHARS),
        );
    }
    check_name(&mut checks, first_name, "First name");
    check_name(&mut checks, last_name, "Last name");
    checks.finish()
}

pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut checks = Checks::default();
    check_email(&mut checks, email);
    checks.require(!password.is_empty(), "Password is required");
    checks.finish()
}

/// Validate an analysis submission and resolve its type (default `standard`).
pub fn validate_analysis(
    address: &str,
    notes: Option<&str>,
    analysis_type: Option<&str>,
) -> Result<AnalysisType, ValidationErrors> {
    let mut checks = Checks::default();

    let address_len = char_len(address.trim());
    if address_len == 0 {
        checks.require(false, "Property address is required");
    } else {
        checks.require(
            address_len >= ADDRESS_CHARS.0,
            format!(
                "The property address must contain at least {} characters",
                ADDRESS_CHARS.0
            ),
        );
        checks.require(
            address_len <= ADDRESS_CHARS.1,
            format!(
                "The property address cannot exceed {} characters",
                ADDRESS_CHARS.1
            ),
        );
    }

    if let Some(notes) = notes {
        checks.require(
            char_len(notes) <= MAX_NOTES_CHARS,
            format!("Acquisition notes cannot exceed {} characters", MAX_NOTES_CHARS),
        );
    }

    let parsed = match analysis_type.map(str::trim).filter(|t| !t.is_empty()) {
        None => Some(AnalysisType::default()),
        Some(raw) => raw.parse::<AnalysisType>().ok(),
    };
    checks.require(
        parsed.is_some(),
        "Analysis type must be one of: standard, detailed, investment",
    );

    checks.finish()?;
    Ok(parsed.unwrap_or_default())
}

/// Trim a search query and require a minimum length.
pub fn validate_search(query: Option<&str>) -> Result<String, ValidationErrors> {
    let query = query.unwrap_or_default().trim();
    if char_len(query) < MIN_SEARCH_CHARS {
        return Err(ValidationErrors(vec![format!(
            "Search query must be at least {} characters",
            MIN_SEARCH_CHARS
        )]));
    }
    Ok(query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_display_joins_messages() {
        let errors = ValidationErrors(vec!["Email is required".into(), "Password is too short".into()]);
        assert_eq!(errors.to_string(), "Email is required; Password is too short");
        let boxed: Box<dyn std::error::Error> = Box::new(errors);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("ada@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.co.uk"));
        for bad in ["", "ada", "ada@", "@example.com", "ada@example", "a b@example.com", "ada@@x.io", "ada@.com"] {
            assert!(!is_valid_email(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_registration_collects_every_error() {
        let err = validate_registration("nope", "short", Some("A"), Some(&"x".repeat(51)))
            .unwrap_err();
        assert_eq!(err.0.len(), 4);
        assert!(err.0.contains(&"Invalid email address".to_string()));
    }

    #[test]
    fn test_registration_names_are_optional() {
        assert!(validate_registration("ada@example.com", "longenough", None, None).is_ok());
    }

    #[test]
    fn test_login_requires_password() {
        let err = validate_login("ada@example.com", "").unwrap_err();
        assert_eq!(err.0, vec!["Password is required".to_string()]);
    }

    #[test]
    fn test_analysis_bounds() {
        assert_eq!(
            validate_analysis("123 Main Street", None, None).unwrap(),
            AnalysisType::Standard
        );
        assert_eq!(
            validate_analysis("123 Main Street", Some(""), Some("investment")).unwrap(),
            AnalysisType::Investment
        );
        assert!(validate_analysis("short", None, None).is_err());
        assert!(validate_analysis(&"a".repeat(501), None, None).is_err());
        assert!(validate_analysis("123 Main Street", Some(&"n".repeat(2001)), None).is_err());
        assert!(validate_analysis("123 Main Street", None, Some("quick")).is_err());
    }

    #[test]
    fn test_search_query_is_trimmed() {
        assert_eq!(validate_search(Some("  oak  ")).unwrap(), "oak");
        assert!(validate_search(Some(" ab ")).is_err());
        assert!(validate_search(None).is_err());
    }
}
