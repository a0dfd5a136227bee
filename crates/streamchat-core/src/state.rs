//! UI-agnostic chat state types
//!
//! A [`Session`] is an immutable snapshot of the conversation. Every change
//! produces a new snapshot, so a renderer holding an older one never sees a
//! half-applied update.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique identifier of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "LLM",
        }
    }
}

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: content.into(),
        }
    }

    /// Empty assistant message that stream fragments are appended to
    pub fn assistant_placeholder(id: MessageId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
        }
    }
}

/// Ordered, append-only list of messages.
///
/// Cloning is cheap: the message list is shared until a writer produces the
/// next snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    messages: Arc<Vec<Message>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
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

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// New snapshot with `message` appended.
    pub fn with_message(&self, message: Message) -> Self {
        let mut messages = Arc::clone(&self.messages);
        Arc::make_mut(&mut messages).push(message);
        Self { messages }
    }

    /// New snapshot with `delta` appended to the content of the last message.
    ///
    /// Returns `None` when the session is empty or the last message is not
    /// `id`; fragments are only ever applied to the message being streamed.
    pub fn with_appended(&self, id: MessageId, delta: &str) -> Option<Self> {
        if self.messages.last().map(|m| m.id) != Some(id) {
            return None;
        }
        let mut messages = Arc::clone(&self.messages);
        if let Some(last) = Arc::make_mut(&mut messages).last_mut() {
            last.content.push_str(delta);
        }
        Some(Self { messages })
    }
}
