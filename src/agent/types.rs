use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    System,
    User,
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

/// A recorded turn in an agent's conversation history.
///
/// Fields are read-only once the message exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Message {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Strip the timestamp for feeding to a provider.
    pub fn to_context(&self) -> ContextMessage {
        ContextMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A vendor-agnostic `{role, content}` pair sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
    pub fn system(text: &str) -> Self {
        Self {
            role: Role::System,
            content: text.to_string(),
        }
    }

    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            content: text.to_string(),
        }
    }

    pub fn assistant(text: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn test_to_context_drops_timestamp() {
        let msg = Message::new(Role::User, "hi", Utc::now());
        assert_eq!(msg.to_context(), ContextMessage::user("hi"));
    }
}
