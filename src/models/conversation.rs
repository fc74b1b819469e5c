use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Message;

pub const DEFAULT_LANGUAGE: &str = "en";

/// A conversation and its full transcript, as last read from the store.
///
/// `version` is the store's revision counter for the document. Writers pass it
/// back as the expected version so a concurrent overwrite is detected instead
/// of silently lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub language: String,
    pub messages: Vec<Message>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The last `n` messages in chronological order.
    pub fn tail(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}
