use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user
    User,
    /// Reply generated by the model
    Bot,
}

/// One message in a chat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message
    pub role: Role,
    /// Message text
    pub content: String,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a bot message
    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            content: content.into(),
        }
    }
}

/// Durable record of one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Session identifier
    pub id: String,
    /// Owner, assigned only when the session is created
    pub user_id: Option<String>,
    /// Messages in conversation order
    pub messages: Vec<Message>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When a message was last appended
    pub last_updated: DateTime<Utc>,
}

impl ChatSession {
    /// Create an empty session stamped with the current time
    pub fn new(id: impl Into<String>, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id,
            messages: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Append a message and bump `last_updated`
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.last_updated = Utc::now();
    }
}
