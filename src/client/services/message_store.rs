use crate::common::models::ChatMessage;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// The message replaced a pending local copy in place
    Reconciled,
    /// Same id already stored, nothing changed
    Duplicate,
}

/// Ordered, id-deduplicated log of the messages of the active room.
///
/// Order is receipt order; the store never sorts by timestamp.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
    pending: HashSet<String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    /// Drops everything, pending copies included, and takes `messages` in
    /// the given order. Repeated ids inside the list keep the first one.
    pub fn replace_all(&mut self, messages: Vec<ChatMessage>) {
        self.clear();
        for msg in messages {
            self.push_new(msg);
        }
    }

    pub fn append(&mut self, msg: ChatMessage) -> AppendOutcome {
        if self.ids.contains(&msg.id) {
            return AppendOutcome::Duplicate;
        }

        if !self.pending.is_empty() {
            let local = self.messages.iter().position(|m| {
                self.pending.contains(&m.id) && m.sender == msg.sender && m.text() == msg.text()
            });
            if let Some(index) = local {
                let old_id = std::mem::take(&mut self.messages[index].id);
                self.pending.remove(&old_id);
                self.ids.remove(&old_id);
                self.ids.insert(msg.id.clone());
                self.messages[index] = msg;
                return AppendOutcome::Reconciled;
            }
        }

        self.push_new(msg);
        AppendOutcome::Inserted
    }

    /// Local copy of a just-sent message, waiting for the server echo
    pub fn insert_pending(&mut self, msg: ChatMessage) -> AppendOutcome {
        let id = msg.id.clone();
        let outcome = self.append(msg);
        if outcome == AppendOutcome::Inserted {
            self.pending.insert(id);
        }
        outcome
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.pending.clear();
    }

    fn push_new(&mut self, msg: ChatMessage) {
        if self.ids.insert(msg.id.clone()) {
            self.messages.push(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::MessageBody;

    fn msg(id: &str, sender: i64, text: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            room_id: 42,
            sender,
            sender_username: format!("user{}", sender),
            timestamp: String::new(),
            body: MessageBody::Text { text: text.to_string() },
        }
    }

    fn ids(store: &MessageStore) -> Vec<&str> {
        store.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn append_is_idempotent_per_id_and_keeps_first_position() {
        let mut store = MessageStore::new();
        for (id, text) in [("a", "1"), ("b", "2"), ("a", "changed"), ("c", "3"), ("b", "x"), ("a", "y")] {
            store.append(msg(id, 1, text));
        }
        assert_eq!(ids(&store), ["a", "b", "c"]);
        assert_eq!(store.messages()[0].text(), "1");
        assert_eq!(store.append(msg("c", 1, "3")), AppendOutcome::Duplicate);
    }

    #[test]
    fn replace_all_discards_previous_contents() {
        let mut store = MessageStore::new();
        store.append(msg("live-1", 1, "x"));
        store.append(msg("live-2", 1, "y"));
        store.replace_all(vec![msg("h1", 2, "a"), msg("h2", 3, "b"), msg("h1", 2, "again")]);
        assert_eq!(ids(&store), ["h1", "h2"]);
        assert!(!store.contains("live-1"));

        store.replace_all(Vec::new());
        assert!(store.is_empty());
    }

    #[test]
    fn echo_reconciles_pending_copy_in_place() {
        let mut store = MessageStore::new();
        store.append(msg("m1", 9, "hey"));
        assert_eq!(store.insert_pending(msg("local-1", 7, "on my way")), AppendOutcome::Inserted);
        store.append(msg("m2", 9, "cool"));
        assert!(store.is_pending("local-1"));

        assert_eq!(store.append(msg("m3", 7, "on my way")), AppendOutcome::Reconciled);
        assert_eq!(ids(&store), ["m1", "m3", "m2"]);
        assert!(!store.is_pending("local-1"));
        assert!(!store.contains("local-1"));
    }

    #[test]
    fn echo_from_someone_else_is_not_reconciled() {
        let mut store = MessageStore::new();
        store.insert_pending(msg("local-1", 7, "ok"));
        assert_eq!(store.append(msg("m1", 8, "ok")), AppendOutcome::Inserted);
        assert_eq!(ids(&store), ["local-1", "m1"]);
    }
}
