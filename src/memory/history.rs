//! Fixed-capacity conversation context.

use std::collections::VecDeque;

use crate::memory::message::{Message, Role};

/// Default number of messages kept per conversation.
pub const DEFAULT_HISTORY_LEN: usize = 10;

/// FIFO message window: appending past capacity drops the oldest messages.
#[derive(Clone, Debug)]
pub struct BoundedHistory {
    max_len: usize,
    messages: VecDeque<Message>,
}

impl BoundedHistory {
    /// Create an empty history holding at most `max_len` messages.
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            messages: VecDeque::with_capacity(max_len.saturating_add(1)),
        }
    }

    /// Rebuild a history by replaying `messages` in order.
    #[must_use]
    pub fn from_messages(max_len: usize, messages: impl IntoIterator<Item = Message>) -> Self {
        let mut history = Self::new(max_len);
        for message in messages {
            history.push_message(message);
        }
        history
    }

    /// Append a message built from `role` and `content`.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.push_message(Message {
            role,
            content: content.into(),
        });
    }

    /// Append a message, evicting from the front while over capacity.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_len {
            self.messages.pop_front();
        }
    }

    /// Messages in chronological order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Most recent assistant message, if any.
    #[must_use]
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
    }

    /// Number of messages currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for BoundedHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}
