//! Wish domain models for the invitation guestbook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::identity::NameKey;
use shared::validation::validate_not_blank;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// RSVP answer collected alongside a wish by some invitation variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attendance {
    Present,
    Absent,
}

impl Attendance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attendance::Present => "present",
            Attendance::Absent => "absent",
        }
    }
}

impl FromStr for Attendance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "present" => Ok(Attendance::Present),
            "absent" => Ok(Attendance::Absent),
            _ => Err(format!("Invalid attendance: {}", s)),
        }
    }
}

impl fmt::Display for Attendance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A guest's recorded confirmation for one invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Wish {
    /// Store-assigned identifier. Not stable across backends; never used for identity.
    pub id: Uuid,
    pub invitation_id: String,
    /// Display name exactly as the guest's link carried it.
    pub name: String,
    pub name_key: NameKey,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<Attendance>,
    /// `None` until the store has assigned a timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

impl Wish {
    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey::new(&self.invitation_id, &self.name_key)
    }
}

/// Storage key encoding the one-wish-per-guest constraint.
///
/// Rendered as `"{invitation_id}:{name_key}"`. A name key never contains `:`,
/// so the last `:` always separates the two parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn new(invitation_id: &str, name_key: &NameKey) -> Self {
        Self(format!("{}:{}", invitation_id, name_key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the key back into `(invitation_id, name_key)`.
    pub fn parts(&self) -> (&str, &str) {
        match self.0.rfind(':') {
            Some(pos) => (&self.0[..pos], &self.0[pos + 1..]),
            None => (self.0.as_str(), ""),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload handed to a store's conditional create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWish {
    pub invitation_id: String,
    pub name: String,
    pub name_key: NameKey,
    pub message: String,
    pub attendance: Option<Attendance>,
}

impl NewWish {
    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey::new(&self.invitation_id, &self.name_key)
    }

    /// Materializes the record once the store has assigned id and timestamp.
    pub fn into_wish(self, id: Uuid, created_at: Option<DateTime<Utc>>) -> Wish {
        Wish {
            id,
            invitation_id: self.invitation_id,
            name: self.name,
            name_key: self.name_key,
            message: self.message,
            attendance: self.attendance,
            created_at,
        }
    }
}

/// What the guest typed into the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct WishDraft {
    /// Stored verbatim; only emptiness is validated.
    #[validate(custom(function = "validate_not_blank"))]
    pub message: String,

    pub attendance: Option<Attendance>,
}

impl WishDraft {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attendance: None,
        }
    }

    pub fn with_attendance(mut self, attendance: Attendance) -> Self {
        self.attendance = Some(attendance);
        self
    }
}

/// Result of a conditional create keyed by [`CompositeKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This call wrote the record.
    Created(Wish),
    /// A record already existed; carries the stored record, not the attempted payload.
    AlreadyExists(Wish),
}

impl CreateOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }

    pub fn wish(&self) -> &Wish {
        match self {
            CreateOutcome::Created(w) | CreateOutcome::AlreadyExists(w) => w,
        }
    }

    pub fn into_wish(self) -> Wish {
        match self {
            CreateOutcome::Created(w) | CreateOutcome::AlreadyExists(w) => w,
        }
    }
}

/// Feed ordering: unconfirmed records first, then newest first.
pub fn feed_order(a: &Wish, b: &Wish) -> Ordering {
    match (a.created_at, b.created_at) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(&x),
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// Sorts a feed in place by [`feed_order`].
pub fn sort_feed(wishes: &mut [Wish]) {
    wishes.sort_by(feed_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shared::normalize;

    fn wish_at(name: &str, created_at: Option<DateTime<Utc>>) -> Wish {
        Wish {
            id: Uuid::new_v4(),
            invitation_id: "inv-1".to_string(),
            name: name.to_string(),
            name_key: normalize(name),
            message: "Congrats!".to_string(),
            attendance: None,
            created_at,
        }
    }

    #[test]
    fn test_attendance_from_str() {
        assert_eq!("present".parse::<Attendance>().unwrap(), Attendance::Present);
        assert_eq!("ABSENT".parse::<Attendance>().unwrap(), Attendance::Absent);
        assert!("maybe".parse::<Attendance>().is_err());
    }

    #[test]
    fn test_attendance_serde() {
        assert_eq!(
            serde_json::to_string(&Attendance::Present).unwrap(),
            "\"present\""
        );
    }

    #[test]
    fn test_composite_key_format() {
        let key = CompositeKey::new("wedding-2024", &normalize("  Jane Doe!!"));
        assert_eq!(key.as_str(), "wedding-2024:jane_doe");
        assert_eq!(key.parts(), ("wedding-2024", "jane_doe"));
    }

    #[test]
    fn test_composite_key_invitation_with_colon() {
        let key = CompositeKey::new("a:b", &normalize("c"));
        assert_eq!(key.parts(), ("a:b", "c"));
        assert_ne!(key, CompositeKey::new("a", &normalize("b:c")));
    }

    #[test]
    fn test_composite_key_same_for_equivalent_names() {
        assert_eq!(
            CompositeKey::new("inv", &normalize("jane doe")),
            CompositeKey::new("inv", &normalize("JANE-DOE"))
        );
    }

    #[test]
    fn test_new_wish_into_wish_preserves_payload() {
        let new = NewWish {
            invitation_id: "inv".to_string(),
            name: "  Jane Doe!!".to_string(),
            name_key: normalize("  Jane Doe!!"),
            message: "  line one\n\n  line two ".to_string(),
            attendance: Some(Attendance::Present),
        };
        let id = Uuid::new_v4();
        let wish = new.clone().into_wish(id, None);
        assert_eq!(wish.id, id);
        assert_eq!(wish.name, new.name);
        assert_eq!(wish.message, new.message);
        assert_eq!(wish.composite_key(), new.composite_key());
    }

    #[test]
    fn test_wish_draft_validation() {
        assert!(WishDraft::new("Congrats!").validate().is_ok());
        assert!(WishDraft::new("   ").validate().is_err());
        assert!(WishDraft::default().validate().is_err());
    }

    #[test]
    fn test_create_outcome_accessors() {
        let wish = wish_at("Jane", Some(Utc::now()));
        let created = CreateOutcome::Created(wish.clone());
        let existing = CreateOutcome::AlreadyExists(wish.clone());
        assert!(created.is_created());
        assert!(!existing.is_created());
        assert_eq!(existing.wish(), &wish);
        assert_eq!(created.into_wish(), wish);
    }

    #[test]
    fn test_sort_feed_newest_first_pending_on_top() {
        let now = Utc::now();
        let old = wish_at("Old", Some(now - Duration::hours(2)));
        let new = wish_at("New", Some(now));
        let pending = wish_at("Pending", None);
        let mut feed = vec![old.clone(), pending.clone(), new.clone()];

        sort_feed(&mut feed);

        let names: Vec<_> = feed.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Pending", "New", "Old"]);
    }

    #[test]
    fn test_wish_serialization_omits_missing_attendance() {
        let wish = wish_at("Jane Doe", None);
        let json = serde_json::to_value(&wish).unwrap();
        assert_eq!(json["name_key"], "jane_doe");
        assert!(json.get("attendance").is_none());
        assert!(json["created_at"].is_null());
    }
}
