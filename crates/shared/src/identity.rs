//! Guest identity normalization.
//!
//! A guest is identified only by the display name carried in the invitation
//! link. The name is reduced to a [`NameKey`] so that formatting noise
//! (case, punctuation, spacing) does not produce a second identity. Two
//! different people whose names normalize to the same key are treated as the
//! same guest.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref NON_KEY_RUN: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Canonical identity derived from a guest display name.
///
/// Only contains `[a-z0-9_]`, never starts or ends with `_`. An empty key
/// means the guest has no usable identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct NameKey(String);

impl NameKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the raw name carried no identity at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Deserialized keys are re-normalized; canonical keys pass through unchanged.
impl From<String> for NameKey {
    fn from(value: String) -> Self {
        normalize(&value)
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NameKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalizes a raw guest name into its identity key.
///
/// Trims, lower-cases ASCII letters, replaces each maximal run of characters
/// outside `[a-z0-9]` with a single `_`, then strips leading and trailing `_`.
/// Non-ASCII letters are not folded and therefore collapse into separators.
pub fn normalize(raw: &str) -> NameKey {
    let lowered = raw.trim().to_ascii_lowercase();
    let collapsed = NON_KEY_RUN.replace_all(&lowered, "_");
    NameKey(collapsed.trim_matches('_').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::name::en::Name;
    use fake::Fake;

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("  Jane Doe!!").as_str(), "jane_doe");
    }

    #[test]
    fn test_normalize_collapses_runs() {
        assert_eq!(normalize("Jane --  Doe").as_str(), "jane_doe");
        assert_eq!(normalize("a...b___c").as_str(), "a_b_c");
    }

    #[test]
    fn test_normalize_same_guest_different_formatting() {
        assert_eq!(normalize("jane doe"), normalize("  Jane Doe!!"));
        assert_eq!(normalize("JANE_DOE"), normalize("Jane.Doe"));
    }

    #[test]
    fn test_normalize_keeps_digits() {
        assert_eq!(normalize("Table 12 - Guest 3").as_str(), "table_12_guest_3");
    }

    #[test]
    fn test_normalize_empty_and_whitespace() {
        assert!(normalize("").is_empty());
        assert!(normalize("   \t\n").is_empty());
    }

    #[test]
    fn test_normalize_punctuation_only_is_empty() {
        assert!(normalize("!!! ---").is_empty());
    }

    #[test]
    fn test_normalize_non_ascii_not_folded() {
        assert_eq!(normalize("Ünal Çelik").as_str(), "nal_elik");
        assert!(normalize("李雷").is_empty());
    }

    #[test]
    fn test_normalize_idempotent() {
        for _ in 0..50 {
            let name: String = Name().fake();
            let once = normalize(&name);
            assert_eq!(normalize(once.as_str()), once, "name: {}", name);
        }
    }

    #[test]
    fn test_normalize_output_alphabet() {
        for _ in 0..50 {
            let name: String = Name().fake();
            let key = normalize(&name);
            assert!(key
                .as_str()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
            assert!(!key.as_str().starts_with('_'));
            assert!(!key.as_str().ends_with('_'));
        }
    }

    #[test]
    fn test_name_key_serde() {
        let key = normalize("Jane Doe");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"jane_doe\"");

        let parsed: NameKey = serde_json::from_str("\"Jane Doe\"").unwrap();
        assert_eq!(parsed, key);
    }
}
