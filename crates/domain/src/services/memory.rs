//! In-process guestbook store.
//!
//! Enforces the one-wish-per-guest invariant under a single lock, which plays
//! the role of the database transaction. Backs the domain tests and the
//! HTTP tests that run without PostgreSQL.

use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use shared::identity::NameKey;

use crate::error::GuestbookError;
use crate::models::{CompositeKey, CreateOutcome, NewWish, Wish};
use crate::services::store::{GuestbookStore, WishChanged};

const CHANGE_BUFFER: usize = 64;

/// Injected failure for the next conditional create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFault {
    /// Fail before touching the data.
    Fail,
    /// Commit the write, then report a failure to the caller.
    LandThenFail,
}

/// Mock-friendly store backed by a `HashMap` keyed by composite key.
pub struct MemoryGuestbook {
    wishes: Mutex<HashMap<CompositeKey, Wish>>,
    create_faults: Mutex<VecDeque<CreateFault>>,
    lookup_faults: AtomicUsize,
    latency: Mutex<Option<Duration>>,
    create_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    changes: broadcast::Sender<WishChanged>,
}

impl Default for MemoryGuestbook {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGuestbook {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            wishes: Mutex::new(HashMap::new()),
            create_faults: Mutex::new(VecDeque::new()),
            lookup_faults: AtomicUsize::new(0),
            latency: Mutex::new(None),
            create_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            changes,
        }
    }

    /// Queues a fault for an upcoming `try_create` call.
    pub fn push_create_fault(&self, fault: CreateFault) {
        lock(&self.create_faults).push_back(fault);
    }

    /// Makes the next `count` point lookups fail.
    pub fn fail_next_lookups(&self, count: usize) {
        self.lookup_faults.store(count, Ordering::SeqCst);
    }

    /// Delays every store call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Number of stored wishes across all invitations.
    pub fn len(&self) -> usize {
        lock(&self.wishes).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Administrative removal of every wish belonging to an invitation.
    pub fn remove_invitation(&self, invitation_id: &str) -> usize {
        let removed = {
            let mut wishes = lock(&self.wishes);
            let before = wishes.len();
            wishes.retain(|_, w| w.invitation_id != invitation_id);
            before - wishes.len()
        };
        if removed > 0 {
            self.publish(invitation_id);
        }
        removed
    }

    fn publish(&self, invitation_id: &str) {
        // No receivers is fine.
        let _ = self.changes.send(WishChanged::invitation(invitation_id));
    }

    /// Announces that changes may have been lost, as a backend does after
    /// losing its notification connection.
    pub fn announce_resync(&self) {
        let _ = self.changes.send(WishChanged::Resync);
    }

    async fn simulate_latency(&self) {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait::async_trait]
impl GuestbookStore for MemoryGuestbook {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn try_create(&self, wish: NewWish) -> Result<CreateOutcome, GuestbookError> {
        if wish.name_key.is_empty() {
            return Err(GuestbookError::NoIdentity);
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let fault = lock(&self.create_faults).pop_front();
        if fault == Some(CreateFault::Fail) {
            return Err(GuestbookError::Transient(
                "simulated connection failure".to_string(),
            ));
        }

        let invitation_id = wish.invitation_id.clone();
        let outcome = match lock(&self.wishes).entry(wish.composite_key()) {
            Entry::Occupied(existing) => CreateOutcome::AlreadyExists(existing.get().clone()),
            Entry::Vacant(slot) => {
                let created = wish.into_wish(Uuid::new_v4(), Some(Utc::now()));
                slot.insert(created.clone());
                CreateOutcome::Created(created)
            }
        };

        if outcome.is_created() {
            self.publish(&invitation_id);
        }

        if fault == Some(CreateFault::LandThenFail) {
            return Err(GuestbookError::Transient(
                "simulated connection reset after commit".to_string(),
            ));
        }
        Ok(outcome)
    }

    async fn get_by_key(
        &self,
        invitation_id: &str,
        name_key: &NameKey,
    ) -> Result<Option<Wish>, GuestbookError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let failing = self
            .lookup_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GuestbookError::Transient(
                "simulated lookup failure".to_string(),
            ));
        }

        let key = CompositeKey::new(invitation_id, name_key);
        Ok(lock(&self.wishes).get(&key).cloned())
    }

    async fn query_by_invitation(
        &self,
        invitation_id: &str,
    ) -> Result<Vec<Wish>, GuestbookError> {
        self.simulate_latency().await;
        Ok(lock(&self.wishes)
            .values()
            .filter(|w| w.invitation_id == invitation_id)
            .cloned()
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<WishChanged> {
        self.changes.subscribe()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::normalize;
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

    #[tokio::test]
    async fn test_try_create_then_already_exists() {
        let store = MemoryGuestbook::new();

        let first = store
            .try_create(new_wish("inv", "  Jane Doe!!", "Congrats!"))
            .await
            .unwrap();
        assert!(first.is_created());

        let second = store
            .try_create(new_wish("inv", "jane doe", "Second message"))
            .await
            .unwrap();
        match second {
            CreateOutcome::AlreadyExists(existing) => {
                assert_eq!(existing.message, "Congrats!");
                assert_eq!(existing.name, "  Jane Doe!!");
            }
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_second_create_never_mutates_first_payload() {
        let store = MemoryGuestbook::new();
        store
            .try_create(new_wish("inv", "Jane", "original"))
            .await
            .unwrap();
        store
            .try_create(new_wish("inv", "JANE", "overwrite attempt"))
            .await
            .unwrap();

        let stored = store
            .get_by_key("inv", &normalize("jane"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.message, "original");
    }

    #[tokio::test]
    async fn test_same_name_different_invitations_are_separate() {
        let store = MemoryGuestbook::new();
        assert!(store
            .try_create(new_wish("inv-a", "Jane", "a"))
            .await
            .unwrap()
            .is_created());
        assert!(store
            .try_create(new_wish("inv-b", "Jane", "b"))
            .await
            .unwrap()
            .is_created());

        let a = store.query_by_invitation("inv-a").await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].message, "a");
    }

    #[tokio::test]
    async fn test_empty_key_rejected_without_store_call() {
        let store = MemoryGuestbook::new();
        let err = store
            .try_create(new_wish("inv", "   ", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err, GuestbookError::NoIdentity);
        assert_eq!(store.create_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_single_winner() {
        let store = Arc::new(MemoryGuestbook::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            let name = if i % 2 == 0 { "Jane Doe" } else { "jane-doe!" };
            handles.push(tokio::spawn(async move {
                store
                    .try_create(new_wish("inv", name, &format!("attempt {}", i)))
                    .await
                    .unwrap()
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let winners: Vec<_> = outcomes.iter().filter(|o| o.is_created()).collect();
        assert_eq!(winners.len(), 1);
        let winner_message = winners[0].wish().message.clone();
        for outcome in &outcomes {
            assert_eq!(outcome.wish().message, winner_message);
        }

        let stored = store.query_by_invitation("inv").await.unwrap();
        let keys: HashSet<_> = stored.iter().map(|w| w.name_key.clone()).collect();
        assert_eq!(keys.len(), stored.len());
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_fault_does_not_write() {
        let store = MemoryGuestbook::new();
        store.push_create_fault(CreateFault::Fail);

        let err = store
            .try_create(new_wish("inv", "Jane", "hi"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_land_then_fail_fault_writes() {
        let store = MemoryGuestbook::new();
        store.push_create_fault(CreateFault::LandThenFail);

        assert!(store
            .try_create(new_wish("inv", "Jane", "hi"))
            .await
            .is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_faults_consumed() {
        let store = MemoryGuestbook::new();
        store.fail_next_lookups(1);
        assert!(store.get_by_key("inv", &normalize("jane")).await.is_err());
        assert!(store.get_by_key("inv", &normalize("jane")).await.is_ok());
        assert_eq!(store.lookup_calls(), 2);
    }

    #[tokio::test]
    async fn test_changes_published_on_create_and_removal() {
        let store = MemoryGuestbook::new();
        let mut changes = store.changes();

        store
            .try_create(new_wish("inv", "Jane", "hi"))
            .await
            .unwrap();
        assert_eq!(changes.recv().await.unwrap(), WishChanged::invitation("inv"));

        assert_eq!(store.remove_invitation("inv"), 1);
        assert_eq!(changes.recv().await.unwrap(), WishChanged::invitation("inv"));
        assert!(store.is_empty());
    }
}
