//! Common validation utilities.

use validator::ValidationError;

/// Returns true when the text has no non-whitespace characters.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Validates that a free-text field carries at least one visible character.
///
/// Only emptiness is checked; length and content are left to the caller.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if is_blank(value) {
        let mut err = ValidationError::new("not_blank");
        err.message = Some("Must not be empty".into());
        Err(err)
    } else {
        Ok(())
    }
}
