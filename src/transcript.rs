//! # Transcript
//!
//! The ordered, append-only history of [`Turn`]s shown to the user.
//!
//! A transcript belongs to exactly one session object
//! ([`ChatSession`](crate::chat::ChatSession) or
//! [`DocumentSession`](crate::ingest::DocumentSession)). Turns are immutable once
//! pushed: their fields are private and only readable through accessors, and the
//! transcript exposes no way to edit or remove a single turn. The only other
//! mutation is [`Transcript::clear`], used when a new knowledge base replaces the
//! old one.
//!
//! ## Example
//! ```rust
//! use docchat::transcript::{Role, Transcript, Turn};
//!
//! let mut transcript = Transcript::seeded("Hello! How can I help?");
//! transcript.push(Turn::user("What is Rust?"));
//! transcript.push(Turn::assistant("A systems programming language."));
//!
//! assert_eq!(transcript.len(), 3);
//! assert_eq!(transcript.last().map(Turn::role), Some(Role::Assistant));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that condition the assistant.
    System,
    /// Text typed by the person at the keyboard.
    User,
    /// Text produced by the model, or an error rendered in its place.
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Append-only list of turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// An empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript that starts with one assistant turn carrying `greeting`.
    ///
    /// This is the state a chat session is in before the user has typed anything.
    pub fn seeded(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::assistant(greeting)],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        tracing::debug!(role = %turn.role, bytes = turn.content.len(), "appending turn");
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop every turn.
    pub fn clear(&mut self) {
        tracing::debug!(dropped = self.turns.len(), "clearing transcript");
        self.turns.clear();
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}
