//! Read-state reconciliation
//!
//! Tracks per-counterpart unread counters and decides which messages of the
//! active conversation still need a read acknowledgement. Acknowledgements
//! are requested at most once per message id for the life of the
//! reconciler, and the local read flag is set before the request goes out.

use std::collections::{HashMap, HashSet};

use crate::models::{Message, MessageId, UserId};
use crate::store::MessageStore;

#[derive(Debug, Clone, Default)]
pub struct ReadStateReconciler {
    unread: HashMap<UserId, u32>,
    counted: HashSet<MessageId>,
    requested: HashSet<MessageId>,
}

impl ReadStateReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed counters from the backend's unread listing, counted by sender.
    pub fn seed(&mut self, unread: &[Message], me: UserId) {
        for message in unread {
            self.record_arrival(message, me);
        }
    }

    /// Count `message` against its sender's unread counter.
    ///
    /// Own messages, already-read messages and ids counted before are
    /// ignored. Returns whether a counter changed.
    pub fn record_arrival(&mut self, message: &Message, me: UserId) -> bool {
        if message.is_from(me) || message.is_read || !self.counted.insert(message.id) {
            return false;
        }
        *self.unread.entry(message.sender.user_id).or_insert(0) += 1;
        true
    }

    /// Unread count for `counterpart`.
    pub fn unread_count(&self, counterpart: UserId) -> u32 {
        self.unread.get(&counterpart).copied().unwrap_or(0)
    }

    /// All non-zero counters.
    pub fn counts(&self) -> &HashMap<UserId, u32> {
        &self.unread
    }

    /// Total unread across counterparts.
    pub fn total(&self) -> u32 {
        self.unread.values().sum()
    }

    /// Reset `counterpart`'s counter.
    pub fn clear(&mut self, counterpart: UserId) {
        self.unread.remove(&counterpart);
    }

    /// Mark every unread inbound message in `store` read locally and return
    /// the ids that have not been acknowledged before.
    ///
    /// Messages sent by `me` are never touched.
    pub fn take_unacknowledged(&mut self, store: &mut MessageStore, me: UserId) -> Vec<MessageId> {
        let pending: Vec<MessageId> = store
            .messages()
            .iter()
            .filter(|m| !m.is_from(me) && !m.is_read)
            .map(|m| m.id)
            .collect();

        let mut fresh = Vec::with_capacity(pending.len());
        for id in pending {
            store.mark_read(id);
            if self.requested.insert(id) {
                fresh.push(id);
            }
        }
        fresh
    }

    /// Whether an acknowledgement for `id` was already requested.
    pub fn was_requested(&self, id: MessageId) -> bool {
        self.requested.contains(&id)
    }

    /// Forget all state; used on sign-out.
    pub fn reset(&mut self) {
        self.unread.clear();
        self.counted.clear();
        self.requested.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Participant, Role};
    use chrono::Utc;

    const ME: UserId = 7;

    fn message(id: MessageId, from: UserId, is_read: bool) -> Message {
        Message {
            id,
            content: "x".to_string(),
            sender: Participant {
                user_id: from,
                username: format!("user{}", from),
                role: if from == ME { Role::Advisor } else { Role::Student },
            },
            receiver: None,
            is_read,
            created_at: Utc::now(),
            chat_box_id: None,
        }
    }

    #[test]
    fn test_arrivals_increment_only_sender_counter() {
        let mut reconciler = ReadStateReconciler::new();
        assert!(reconciler.record_arrival(&message(1, 42, false), ME));
        assert!(reconciler.record_arrival(&message(2, 42, false), ME));
        assert!(reconciler.record_arrival(&message(3, 43, false), ME));

        assert_eq!(reconciler.unread_count(42), 2);
        assert_eq!(reconciler.unread_count(43), 1);
        assert_eq!(reconciler.unread_count(44), 0);
        assert_eq!(reconciler.total(), 3);
    }

    #[test]
    fn test_own_read_and_repeated_arrivals_not_counted() {
        let mut reconciler = ReadStateReconciler::new();
        assert!(!reconciler.record_arrival(&message(1, ME, false), ME));
        assert!(!reconciler.record_arrival(&message(2, 42, true), ME));
        assert!(reconciler.record_arrival(&message(3, 42, false), ME));
        assert!(!reconciler.record_arrival(&message(3, 42, false), ME));
        assert_eq!(reconciler.unread_count(42), 1);
        assert_eq!(reconciler.unread_count(ME), 0);
    }

    #[test]
    fn test_seed_counts_by_sender() {
        let mut reconciler = ReadStateReconciler::new();
        reconciler.seed(
            &[message(1, 42, false), message(2, 42, false), message(3, 43, false)],
            ME,
        );
        assert_eq!(reconciler.unread_count(42), 2);
        assert_eq!(reconciler.unread_count(43), 1);

        reconciler.clear(42);
        assert_eq!(reconciler.unread_count(42), 0);
        assert_eq!(reconciler.unread_count(43), 1);
    }

    #[test]
    fn test_take_unacknowledged_skips_own_and_marks_locally() {
        let mut store = MessageStore::new();
        store.append(message(1, 42, false));
        store.append(message(2, ME, false));
        store.append(message(3, 42, true));
        store.append(message(4, 42, false));

        let mut reconciler = ReadStateReconciler::new();
        let ids = reconciler.take_unacknowledged(&mut store, ME);
        assert_eq!(ids, vec![1, 4]);
        assert!(store.get(1).unwrap().is_read);
        assert!(store.get(4).unwrap().is_read);
        assert!(!store.get(2).unwrap().is_read);
    }

    #[test]
    fn test_acknowledgement_requested_once_per_id() {
        let mut store = MessageStore::new();
        store.append(message(1, 42, false));

        let mut reconciler = ReadStateReconciler::new();
        assert_eq!(reconciler.take_unacknowledged(&mut store, ME), vec![1]);
        assert!(reconciler.take_unacknowledged(&mut store, ME).is_empty());

        // Rehydrating with a stale unread copy must not request again.
        store.hydrate(vec![message(1, 42, false)]);
        assert!(reconciler.take_unacknowledged(&mut store, ME).is_empty());
        assert!(store.get(1).unwrap().is_read);
        assert!(reconciler.was_requested(1));
    }

    #[test]
    fn test_activation_clears_any_number_of_unread() {
        for n in [0usize, 1, 5] {
            let mut store = MessageStore::new();
            let mut reconciler = ReadStateReconciler::new();
            for i in 0..n {
                let m = message(i as MessageId + 1, 42, false);
                reconciler.record_arrival(&m, ME);
                store.append(m);
            }

            let ids = reconciler.take_unacknowledged(&mut store, ME);
            reconciler.clear(42);

            assert_eq!(ids.len(), n);
            assert_eq!(reconciler.unread_count(42), 0);
            assert!(store.messages().iter().all(|m| m.is_read));
        }
    }
}
