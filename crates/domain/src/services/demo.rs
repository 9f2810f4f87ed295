//! Preview guestbook for unsaved invitations.
//!
//! Invitations whose id ends with the demo suffix never touch the database.
//! Each one gets a deterministic set of example wishes derived from its id,
//! and submissions are appended to a per-process list without any
//! one-per-guest enforcement.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use uuid::{Builder, Uuid};

use shared::crypto::stable_seed;
use shared::identity::{normalize, NameKey};

use crate::error::GuestbookError;
use crate::models::{Attendance, CreateOutcome, NewWish, Wish};
use crate::services::store::{GuestbookStore, WishChanged};

/// Reserved suffix marking a preview invitation.
pub const DEFAULT_DEMO_SUFFIX: &str = "-demo";

/// Number of example wishes seeded per preview invitation.
pub const DEMO_SEED_COUNT: usize = 5;

/// Upper bound on a preview list; the oldest appended entries are dropped first.
pub const DEMO_LIST_CAP: usize = DEMO_SEED_COUNT + 100;

// 2024-01-01T12:00:00Z
const DEMO_ANCHOR_SECS: i64 = 1_704_110_400;

const DEMO_NAMES: &[&str] = &[
    "Amelia Hart",
    "Budi Santoso",
    "Clara Wijaya",
    "Daniel Moreau",
    "Eka Pratama",
    "Fiona Gallagher",
    "Gilang Ramadhan",
    "Hana Kusuma",
    "Isaac Bennett",
    "Julia Novak",
    "Kevin Tanaka",
    "Lina Marlina",
];

const DEMO_MESSAGES: &[&str] = &[
    "Congratulations to the both of you! Wishing you a lifetime of love.",
    "So happy for you two. See you on the big day!",
    "May your home be filled with laughter and your hearts with joy.",
    "Cheers to love, adventure and many happy years together.",
    "Sorry we can't make it, sending you all our love from afar.",
    "What a beautiful couple. Congratulations and best wishes!",
    "Can't wait to celebrate with you. Congrats!",
    "Wishing you patience, kindness and a whole lot of fun.",
    "Happy wedding! Thank you for inviting us.",
    "Love is patient, love is kind. Congratulations!",
];

/// Returns true when the invitation id marks an unsaved preview.
pub fn is_demo_invitation(invitation_id: &str, suffix: &str) -> bool {
    !suffix.is_empty() && invitation_id.ends_with(suffix)
}

/// Deterministic example wishes for a preview invitation.
///
/// The same invitation id always yields the same names, messages, ids and
/// timestamps.
pub fn seed_wishes(invitation_id: &str) -> Vec<Wish> {
    let mut rng = StdRng::seed_from_u64(stable_seed(invitation_id));
    let anchor = DateTime::<Utc>::from_timestamp(DEMO_ANCHOR_SECS, 0).unwrap_or_default();

    let names = rand::seq::index::sample(&mut rng, DEMO_NAMES.len(), DEMO_SEED_COUNT);
    let mut created_at = anchor;

    names
        .into_iter()
        .map(|idx| {
            let name = DEMO_NAMES[idx];
            let message = DEMO_MESSAGES[rng.gen_range(0..DEMO_MESSAGES.len())];
            let attendance = if rng.gen_bool(0.8) {
                Attendance::Present
            } else {
                Attendance::Absent
            };
            created_at -= Duration::minutes(rng.gen_range(5..240));

            Wish {
                id: Builder::from_random_bytes(rng.gen()).into_uuid(),
                invitation_id: invitation_id.to_string(),
                name: name.to_string(),
                name_key: normalize(name),
                message: message.to_string(),
                attendance: Some(attendance),
                created_at: Some(created_at),
            }
        })
        .collect()
}

/// In-memory stand-in for the store and feed of preview invitations.
pub struct DemoGuestbook {
    lists: Mutex<HashMap<String, Vec<Wish>>>,
    changes: broadcast::Sender<WishChanged>,
}

impl Default for DemoGuestbook {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoGuestbook {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            lists: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn lists(&self) -> MutexGuard<'_, HashMap<String, Vec<Wish>>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl GuestbookStore for DemoGuestbook {
    fn backend(&self) -> &'static str {
        "demo"
    }

    async fn try_create(&self, wish: NewWish) -> Result<CreateOutcome, GuestbookError> {
        if wish.name_key.is_empty() {
            return Err(GuestbookError::NoIdentity);
        }

        let invitation_id = wish.invitation_id.clone();
        let created = wish.into_wish(Uuid::new_v4(), Some(Utc::now()));
        {
            let mut lists = self.lists();
            let list = lists
                .entry(invitation_id.clone())
                .or_insert_with(|| seed_wishes(&invitation_id));
            if list.len() >= DEMO_LIST_CAP {
                list.remove(DEMO_SEED_COUNT);
            }
            list.push(created.clone());
        }

        tracing::debug!(
            invitation_id = %invitation_id,
            name_key = %created.name_key,
            "Demo wish appended locally"
        );
        let _ = self.changes.send(WishChanged::Invitation(invitation_id));
        Ok(CreateOutcome::Created(created))
    }

    async fn get_by_key(
        &self,
        invitation_id: &str,
        name_key: &NameKey,
    ) -> Result<Option<Wish>, GuestbookError> {
        // Seeds are examples, not submissions; only local appends identify a guest.
        let lists = self.lists();
        Ok(lists.get(invitation_id).and_then(|list| {
            list.iter()
                .skip(DEMO_SEED_COUNT)
                .rev()
                .find(|w| &w.name_key == name_key)
                .cloned()
        }))
    }

    async fn query_by_invitation(
        &self,
        invitation_id: &str,
    ) -> Result<Vec<Wish>, GuestbookError> {
        let mut lists = self.lists();
        Ok(lists
            .entry(invitation_id.to_string())
            .or_insert_with(|| seed_wishes(invitation_id))
            .clone())
    }

    fn changes(&self) -> broadcast::Receiver<WishChanged> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sort_feed, WishDraft};
    use crate::services::submission::{Submission, SubmissionState, SubmitOutcome};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn new_wish(invitation_id: &str, name: &str, message: &str) -> NewWish {
        NewWish {
            invitation_id: invitation_id.to_string(),
            name: name.to_string(),
            name_key: normalize(name),
            message: message.to_string(),
            attendance: None,
        }
    }

    #[test]
    fn test_is_demo_invitation() {
        assert!(is_demo_invitation("acme-demo", DEFAULT_DEMO_SUFFIX));
        assert!(!is_demo_invitation("acme", DEFAULT_DEMO_SUFFIX));
        assert!(!is_demo_invitation("acme-demo", ""));
    }

    #[test]
    fn test_seed_wishes_deterministic() {
        assert_eq!(seed_wishes("acme-demo"), seed_wishes("acme-demo"));
    }

    #[test]
    fn test_seed_wishes_shape() {
        let seeds = seed_wishes("acme-demo");
        assert_eq!(seeds.len(), DEMO_SEED_COUNT);

        let keys: HashSet<_> = seeds.iter().map(|w| w.name_key.clone()).collect();
        assert_eq!(keys.len(), DEMO_SEED_COUNT);
        for wish in &seeds {
            assert_eq!(wish.invitation_id, "acme-demo");
            assert!(wish.created_at.is_some());
            assert!(!wish.message.is_empty());
        }
    }

    #[test]
    fn test_seed_wishes_vary_by_invitation() {
        let a: Vec<_> = seed_wishes("acme-demo").into_iter().map(|w| w.id).collect();
        let b: Vec<_> = seed_wishes("other-demo").into_iter().map(|w| w.id).collect();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_query_returns_seeds() {
        let demo = DemoGuestbook::new();
        let wishes = demo.query_by_invitation("acme-demo").await.unwrap();
        assert_eq!(wishes, seed_wishes("acme-demo"));
    }

    #[tokio::test]
    async fn test_try_create_appends_sixth_locally() {
        let demo = DemoGuestbook::new();
        let outcome = demo
            .try_create(new_wish("acme-demo", "Jane Doe", "Congrats!"))
            .await
            .unwrap();
        assert!(outcome.is_created());

        let mut wishes = demo.query_by_invitation("acme-demo").await.unwrap();
        assert_eq!(wishes.len(), DEMO_SEED_COUNT + 1);

        sort_feed(&mut wishes);
        assert_eq!(wishes[0].message, "Congrats!");
    }

    #[tokio::test]
    async fn test_try_create_does_not_enforce_uniqueness() {
        let demo = DemoGuestbook::new();
        for message in ["one", "two"] {
            assert!(demo
                .try_create(new_wish("acme-demo", "Jane", message))
                .await
                .unwrap()
                .is_created());
        }
        let found = demo
            .get_by_key("acme-demo", &normalize("jane"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.message, "two");
    }

    #[tokio::test]
    async fn test_seed_names_are_not_submissions() {
        let demo = DemoGuestbook::new();
        let seeded = seed_wishes("acme-demo").remove(0);

        assert!(demo
            .get_by_key("acme-demo", &seeded.name_key)
            .await
            .unwrap()
            .is_none());
        demo.query_by_invitation("acme-demo").await.unwrap();
        assert!(demo
            .get_by_key("acme-demo", &seeded.name_key)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_guest_named_like_seed_can_sign() {
        let demo: Arc<dyn GuestbookStore> = Arc::new(DemoGuestbook::new());
        let seeded = seed_wishes("acme-demo").remove(0);

        let submission = Submission::new(demo.clone(), "acme-demo", seeded.name.clone());
        assert!(submission.restore().await.unwrap().is_none());
        assert_eq!(submission.state(), SubmissionState::Idle);

        let outcome = submission
            .submit(&WishDraft::new("my own wish"))
            .await
            .unwrap();
        match outcome {
            SubmitOutcome::Created(wish) => assert_eq!(wish.message, "my own wish"),
            other => panic!("expected Created, got {:?}", other),
        }

        let wishes = demo.query_by_invitation("acme-demo").await.unwrap();
        assert_eq!(wishes.len(), DEMO_SEED_COUNT + 1);
    }

    #[tokio::test]
    async fn test_try_create_rejects_empty_identity() {
        let demo = DemoGuestbook::new();
        let err = demo
            .try_create(new_wish("acme-demo", "", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err, GuestbookError::NoIdentity);
    }

    #[tokio::test]
    async fn test_list_cap_keeps_seeds() {
        let demo = DemoGuestbook::new();
        for i in 0..(DEMO_LIST_CAP + 3) {
            demo.try_create(new_wish("acme-demo", &format!("guest {}", i), "hi"))
                .await
                .unwrap();
        }
        let wishes = demo.query_by_invitation("acme-demo").await.unwrap();
        assert_eq!(wishes.len(), DEMO_LIST_CAP);
        assert_eq!(&wishes[..DEMO_SEED_COUNT], &seed_wishes("acme-demo")[..]);
    }
}
