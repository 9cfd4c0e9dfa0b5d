//! Conversation storage with one in-flight message per sender.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_core::story::ACTION_LISTEN_NAME;
use parley_core::{DialogueStateTracker, Domain, Event};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

/// Keeps trackers between messages.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    async fn retrieve(&self, sender_id: &str) -> Option<DialogueStateTracker>;

    async fn save(&self, tracker: &DialogueStateTracker);

    /// Exclusive access to a sender's conversation. Held for the whole of
    /// processing one message; other senders are unaffected.
    async fn lock(&self, sender_id: &str) -> OwnedMutexGuard<()>;

    /// The stored tracker, or a fresh one that starts by listening.
    async fn get_or_create(&self, sender_id: &str, domain: &Domain) -> DialogueStateTracker {
        match self.retrieve(sender_id).await {
            Some(tracker) => tracker,
            None => {
                tracing::debug!(sender_id = %sender_id, "Creating a new tracker");
                let mut tracker = domain.new_tracker(sender_id);
                tracker.update(Event::action(ACTION_LISTEN_NAME));
                tracker
            }
        }
    }
}

/// Trackers kept in memory for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryTrackerStore {
    trackers: RwLock<HashMap<String, DialogueStateTracker>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InMemoryTrackerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sender_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.trackers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of senders that currently have a lock entry.
    pub fn lock_count(&self) -> usize {
        self.locks.lock().expect("sender lock map poisoned").len()
    }

    fn sender_lock(&self, sender_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("sender lock map poisoned");
        if !locks.contains_key(sender_id) {
            // An entry only the map refers to has no holder and no waiter.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(sender_id.to_string()).or_default())
    }
}

#[async_trait]
impl TrackerStore for InMemoryTrackerStore {
    async fn retrieve(&self, sender_id: &str) -> Option<DialogueStateTracker> {
        self.trackers.read().await.get(sender_id).cloned()
    }

    async fn save(&self, tracker: &DialogueStateTracker) {
        self.trackers
            .write()
            .await
            .insert(tracker.sender_id().to_string(), tracker.clone());
    }

    async fn lock(&self, sender_id: &str) -> OwnedMutexGuard<()> {
        self.sender_lock(sender_id).lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_new_trackers_start_listening() {
        let domain = Domain::from_yaml("intents: [greet]").unwrap();
        let store = InMemoryTrackerStore::new();
        let tracker = store.get_or_create("u1", &domain).await;
        assert_eq!(tracker.events(), &[Event::action(ACTION_LISTEN_NAME)]);
        assert!(store.retrieve("u1").await.is_none());

        store.save(&tracker).await;
        assert_eq!(store.sender_ids().await, vec!["u1"]);
        assert_eq!(store.get_or_create("u1", &domain).await.events().len(), 1);
    }

    #[tokio::test]
    async fn test_lock_is_per_sender() {
        let store = Arc::new(InMemoryTrackerStore::new());
        let guard = store.lock("u1").await;

        // Another sender is not blocked.
        let other = tokio::time::timeout(Duration::from_millis(100), store.lock("u2")).await;
        assert!(other.is_ok());

        // The same sender waits until the first guard is dropped.
        let same = tokio::time::timeout(Duration::from_millis(50), store.lock("u1")).await;
        assert!(same.is_err());
        drop(guard);
        let same = tokio::time::timeout(Duration::from_millis(100), store.lock("u1")).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn test_idle_sender_locks_are_dropped() {
        let store = InMemoryTrackerStore::new();
        for i in 0..10 {
            drop(store.lock(&format!("u{i}")).await);
        }
        assert_eq!(store.lock_count(), 1);

        // A held lock survives other senders coming and going.
        let held = store.lock("busy").await;
        drop(store.lock("other").await);
        drop(store.lock("another").await);
        assert_eq!(store.lock_count(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(50), store.lock("busy")).await;
        assert!(blocked.is_err());
        drop(held);
        drop(store.lock("late").await);
        assert_eq!(store.lock_count(), 1);
    }
}
