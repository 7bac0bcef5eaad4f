//! Input validation shared by the auth surface.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("email regex is valid")
    })
}

/// Reject obviously malformed email addresses before they reach the remote.
pub fn validate_email(email: &str) -> Result<()> {
    if email_re().is_match(email.trim()) {
        Ok(())
    } else {
        Err(Error::Validation(format!("malformed email address: {email:?}")))
    }
}

/// Reject empty or whitespace-only required fields.
pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}
