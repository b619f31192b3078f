//! Events delivered by a platform to the core.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::platform::{ChannelId, GuildId, MessageRef, UserId};

/// A message posted by someone on the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message: MessageRef,
    pub author: UserId,
    #[serde(default)]
    pub guild: Option<GuildId>,
    pub content: String,
    /// Attachment references (file names or URLs).
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl IncomingMessage {
    pub fn channel(&self) -> &ChannelId {
        &self.message.channel
    }
}

/// A message whose content was edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEdit {
    pub before: IncomingMessage,
    pub after: IncomingMessage,
}

/// A reaction control activated on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub message: MessageRef,
    pub user: UserId,
    /// The activated [`Button`](crate::Button) id.
    pub control: String,
}

/// An event from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    Message(IncomingMessage),
    MessageEdit(MessageEdit),
    ReactionAdd(ReactionEvent),
    /// Anything else, identified by name.
    Custom { name: String, payload: Value },
}

impl PlatformEvent {
    /// Event name used for subscriptions.
    pub fn name(&self) -> &str {
        match self {
            Self::Message(_) => "message",
            Self::MessageEdit(_) => "message_edit",
            Self::ReactionAdd(_) => "reaction_add",
            Self::Custom { name, .. } => name,
        }
    }

    /// The user that caused this event, if any.
    pub fn author(&self) -> Option<&UserId> {
        match self {
            Self::Message(m) => Some(&m.author),
            Self::MessageEdit(e) => Some(&e.after.author),
            Self::ReactionAdd(r) => Some(&r.user),
            Self::Custom { .. } => None,
        }
    }

    /// The channel this event happened in, if any.
    pub fn channel(&self) -> Option<&ChannelId> {
        match self {
            Self::Message(m) => Some(m.channel()),
            Self::MessageEdit(e) => Some(e.after.channel()),
            Self::ReactionAdd(r) => Some(&r.message.channel),
            Self::Custom { .. } => None,
        }
    }

    pub fn as_message(&self) -> Option<&IncomingMessage> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_reaction(&self) -> Option<&ReactionEvent> {
        match self {
            Self::ReactionAdd(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(author: &str, content: &str) -> IncomingMessage {
        IncomingMessage {
            message: MessageRef::new("c1", "m1"),
            author: UserId::new(author),
            guild: None,
            content: content.to_string(),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(PlatformEvent::Message(message("a", "hi")).name(), "message");
        let custom = PlatformEvent::Custom {
            name: "member_join".into(),
            payload: Value::Null,
        };
        assert_eq!(custom.name(), "member_join");
        assert_eq!(custom.author(), None);
    }

    #[test]
    fn test_event_deserializes_from_tagged_json() {
        let json = r#"{
            "type": "reaction_add",
            "message": {"channel": "c1", "id": "m9"},
            "user": "u2",
            "control": "next"
        }"#;
        let event: PlatformEvent = serde_json::from_str(json).unwrap();
        let reaction = event.as_reaction().unwrap();
        assert_eq!(reaction.control, "next");
        assert_eq!(event.channel(), Some(&ChannelId::new("c1")));
    }
}
