//! Message store for the active conversation
//!
//! Holds the messages of one conversation in ascending `created_at` order.
//! `append` is idempotent by message id, which absorbs the double delivery
//! of a self-sent message (once as the send result, once as the server's
//! `newMessage` echo). Messages with equal timestamps keep arrival order.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use crate::models::{Message, MessageId};

/// Ordered, deduplicated message log.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

/// Messages sharing one calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGroup<'a> {
    pub date: NaiveDate,
    pub messages: Vec<&'a Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole log with `messages`.
    ///
    /// Input is sorted by `created_at` (stable) and duplicate ids keep their
    /// first occurrence.
    pub fn hydrate(&mut self, messages: Vec<Message>) {
        self.messages.clear();
        let mut sorted = messages;
        sorted.sort_by_key(|m| m.created_at);
        for message in sorted {
            self.append(message);
        }
    }

    /// Insert `message` at its ordered position.
    ///
    /// Returns `false` and leaves the log untouched when a message with the
    /// same id is already present.
    pub fn append(&mut self, message: Message) -> bool {
        if self.contains(message.id) {
            return false;
        }
        // Tail insert in the common case; earlier timestamps land in place.
        let at = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(at, message);
        true
    }

    /// Set the read flag of `id`.
    ///
    /// Returns `true` only when the flag changed. The flag never goes back
    /// to `false`.
    pub fn mark_read(&mut self, id: MessageId) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) if !message.is_read => {
                message.is_read = true;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// All messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Messages partitioned by local calendar date.
    pub fn grouped_by_date(&self) -> Vec<DateGroup<'_>> {
        self.grouped_by_date_in(&Local)
    }

    /// Messages partitioned by calendar date in `tz`, groups ascending.
    pub fn grouped_by_date_in<Tz: TimeZone>(&self, tz: &Tz) -> Vec<DateGroup<'_>> {
        let mut groups: Vec<DateGroup<'_>> = Vec::new();
        for message in &self.messages {
            let date = local_date(message.created_at, tz);
            match groups.last_mut() {
                Some(group) if group.date == date => group.messages.push(message),
                _ => groups.push(DateGroup {
                    date,
                    messages: vec![message],
                }),
            }
        }
        groups
    }
}

fn local_date<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Participant, Role};
    use chrono::{Duration, FixedOffset};

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::minutes(minutes)
    }

    fn message(id: MessageId, created_at: DateTime<Utc>) -> Message {
        Message {
            id,
            content: format!("message {}", id),
            sender: Participant {
                user_id: 42,
                username: "an".to_string(),
                role: Role::Student,
            },
            receiver: None,
            is_read: false,
            created_at,
            chat_box_id: None,
        }
    }

    fn ids(store: &MessageStore) -> Vec<MessageId> {
        store.messages().iter().map(|m| m.id).collect()
    }

    #[test]
    fn test_increasing_appends_keep_call_order() {
        let mut store = MessageStore::new();
        for (i, id) in [5, 3, 9, 1].into_iter().enumerate() {
            assert!(store.append(message(id, at(i as i64))));
        }
        assert_eq!(ids(&store), vec![5, 3, 9, 1]);
    }

    #[test]
    fn test_out_of_order_append_inserts_in_position() {
        let mut store = MessageStore::new();
        store.append(message(1, at(0)));
        store.append(message(2, at(10)));
        store.append(message(3, at(20)));
        store.append(message(4, at(5)));
        assert_eq!(ids(&store), vec![1, 4, 2, 3]);

        store.append(message(5, at(-5)));
        assert_eq!(ids(&store), vec![5, 1, 4, 2, 3]);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut store = MessageStore::new();
        store.append(message(1, at(0)));
        store.append(message(2, at(0)));
        store.append(message(3, at(0)));
        assert_eq!(ids(&store), vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_append_is_noop() {
        let mut store = MessageStore::new();
        let original = message(1003, at(0));
        assert!(store.append(original.clone()));

        let mut echo = original.clone();
        echo.content = "different".to_string();
        assert!(!store.append(echo));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1003), Some(&original));
    }

    #[test]
    fn test_mark_read_is_monotonic() {
        let mut store = MessageStore::new();
        store.append(message(1, at(0)));
        assert!(store.mark_read(1));
        assert!(!store.mark_read(1));
        assert!(!store.mark_read(99));

        // A later append of an unread copy cannot revert the flag.
        store.append(message(1, at(0)));
        store.append(message(2, at(1)));
        assert!(store.get(1).unwrap().is_read);
    }

    #[test]
    fn test_hydrate_replaces_sorts_and_dedups() {
        let mut store = MessageStore::new();
        store.append(message(100, at(0)));

        store.hydrate(vec![
            message(3, at(30)),
            message(1, at(10)),
            message(2, at(20)),
            message(1, at(10)),
        ]);
        assert_eq!(ids(&store), vec![1, 2, 3]);
        assert!(!store.contains(100));

        store.hydrate(Vec::new());
        assert!(store.is_empty());
    }

    #[test]
    fn test_grouping_follows_timezone_dates() {
        let mut store = MessageStore::new();
        // 2024-03-01 08:00Z, 2024-03-01 20:00Z, 2024-03-02 09:00Z
        store.append(message(1, at(0)));
        store.append(message(2, at(12 * 60)));
        store.append(message(3, at(25 * 60)));

        let utc_groups = store.grouped_by_date_in(&Utc);
        assert_eq!(utc_groups.len(), 2);
        assert_eq!(utc_groups[0].messages.len(), 2);

        // UTC+7 pushes the 20:00Z message onto the next day.
        let plus7 = FixedOffset::east_opt(7 * 3600).unwrap();
        let groups = store.grouped_by_date_in(&plus7);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].messages.len(), 1);
        assert_eq!(groups[1].messages.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2, 3]);
        assert!(groups[0].date < groups[1].date);
    }
}
