use crate::types::{Message, MessagePatch};
use tokio::sync::mpsc;

/// Change notification sent to transcript subscribers, in mutation order.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptChange {
    Appended { index: usize, message: Message },
    Replaced { index: usize, message: Message },
    Truncated { index: usize },
    Cleared,
}

/// Ordered conversation messages. The only mutation path for the transcript.
#[derive(Default)]
pub struct TranscriptStore {
    messages: Vec<Message>,
    subscribers: Vec<mpsc::UnboundedSender<TranscriptChange>>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TranscriptChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn append(&mut self, message: Message) -> usize {
        let index = self.messages.len();
        self.messages.push(message.clone());
        self.notify(TranscriptChange::Appended { index, message });
        index
    }

    /// Shallow-merges `patch` into the message at `index`. Out of range is a no-op.
    pub fn replace_at(&mut self, index: usize, patch: MessagePatch) -> bool {
        let Some(message) = self.messages.get_mut(index) else {
            return false;
        };
        patch.apply(message);
        let message = message.clone();
        self.notify(TranscriptChange::Replaced { index, message });
        true
    }

    pub fn truncate_last(&mut self) -> Option<Message> {
        let removed = self.messages.pop()?;
        let index = self.messages.len();
        self.notify(TranscriptChange::Truncated { index });
        Some(removed)
    }

    pub fn clear(&mut self) {
        if self.messages.is_empty() {
            return;
        }
        self.messages.clear();
        self.notify(TranscriptChange::Cleared);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn notify(&mut self, change: TranscriptChange) {
        self.subscribers
            .retain(|subscriber| subscriber.send(change.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentPart, CycleId, Fragment, Role};

    fn user(text: &str) -> Message {
        Message::user(vec![ContentPart::text(text)])
    }

    #[test]
    fn test_append_and_truncate_notify_in_order() {
        let mut store = TranscriptStore::new();
        let mut changes = store.subscribe();

        assert_eq!(store.append(user("a")), 0);
        assert_eq!(store.append(user("b")), 1);
        let removed = store.truncate_last().expect("removed");
        assert_eq!(removed.content, vec![ContentPart::text("b")]);
        assert_eq!(store.len(), 1);

        assert!(matches!(
            changes.try_recv().unwrap(),
            TranscriptChange::Appended { index: 0, .. }
        ));
        assert!(matches!(
            changes.try_recv().unwrap(),
            TranscriptChange::Appended { index: 1, .. }
        ));
        assert_eq!(
            changes.try_recv().unwrap(),
            TranscriptChange::Truncated { index: 1 }
        );
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_empty_store_operations_are_noops() {
        let mut store = TranscriptStore::new();
        let mut changes = store.subscribe();

        assert!(store.truncate_last().is_none());
        assert!(!store.replace_at(0, MessagePatch::default()));
        store.clear();
        assert!(store.last_message().is_none());
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_replace_at_merges_fields() {
        let mut store = TranscriptStore::new();
        store.append(Message::assistant(Fragment::default(), CycleId(1)));

        let fragment = Fragment {
            commentary: Some("updated".to_string()),
            ..Fragment::default()
        };
        assert!(store.replace_at(
            0,
            MessagePatch {
                content: Some(fragment.assistant_content()),
                fragment: Some(fragment.clone()),
                ..MessagePatch::default()
            }
        ));

        let last = store.last_message().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.cycle, Some(CycleId(1)));
        assert_eq!(last.fragment.as_ref(), Some(&fragment));
        assert_eq!(last.content[0], ContentPart::text("updated"));
    }

    #[test]
    fn test_clear_drops_everything_and_closed_subscribers() {
        let mut store = TranscriptStore::new();
        let dropped = store.subscribe();
        drop(dropped);
        let mut live = store.subscribe();

        store.append(user("a"));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.subscribers.len(), 1);
        assert!(matches!(
            live.try_recv().unwrap(),
            TranscriptChange::Appended { .. }
        ));
        assert_eq!(live.try_recv().unwrap(), TranscriptChange::Cleared);
    }
}
