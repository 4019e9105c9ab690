use aura_llm::StreamTarget;

use crate::message::{AttachmentMeta, Message, MessageId, MessageStatus};

/// Ordered, append-only transcript.
///
/// Messages are never removed or reordered; only `text` and `status` change
/// after insertion. Ids come from a counter that only grows, which keeps the
/// backing vector sorted by id and lets lookups binary search.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    next_id: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
        }
    }

    /// All messages in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Looks a message up by id.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.index_of(id).map(|index| &self.messages[index])
    }

    /// Appends a finished user message with its attachment summary.
    pub fn push_user(
        &mut self,
        text: impl Into<String>,
        attachment: Option<AttachmentMeta>,
    ) -> MessageId {
        let id = self.alloc_id();
        self.messages.push(Message::user(id, text, attachment));
        id
    }

    /// Appends a finished assistant message, such as the greeting.
    pub fn push_assistant(&mut self, text: impl Into<String>) -> MessageId {
        let id = self.alloc_id();
        self.messages.push(Message::assistant(id, text));
        id
    }

    /// Appends the empty reply that streamed deltas are written into.
    pub fn push_assistant_placeholder(&mut self, target: StreamTarget) -> MessageId {
        let id = self.alloc_id();
        self.messages
            .push(Message::assistant_placeholder(id, target));
        id
    }

    /// Overwrites the text of an existing message. Returns false for unknown ids.
    pub fn set_text(&mut self, id: MessageId, text: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Replaces the status of an existing message. Returns false for unknown ids.
    pub fn set_status(&mut self, id: MessageId, status: MessageStatus) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.status = status;
                true
            }
            None => false,
        }
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.index_of(id).map(|index| &mut self.messages[index])
    }

    fn index_of(&self, id: MessageId) -> Option<usize> {
        self.messages
            .binary_search_by_key(&id, |message| message.id)
            .ok()
    }

    fn alloc_id(&mut self) -> MessageId {
        // `Default` leaves the counter at zero; id 0 is never handed out.
        self.next_id = self.next_id.max(1);
        let id = MessageId::new(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }
}
