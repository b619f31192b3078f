//! The chat platform contract.
//!
//! The core never talks to the network itself. Everything it needs from a
//! chat platform goes through the [`Platform`] trait: sending a message,
//! editing and deleting it, and attaching reaction controls. Incoming events
//! flow the other way as [`PlatformEvent`](crate::PlatformEvent)s.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlatformResult;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a user on the platform.
    UserId
);
string_id!(
    /// Identifier of a channel (or direct conversation).
    ChannelId
);
string_id!(
    /// Identifier of a guild / server / group.
    GuildId
);

/// A reference to one posted message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel: ChannelId,
    pub id: String,
}

impl MessageRef {
    pub fn new(channel: impl Into<ChannelId>, id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.id)
    }
}

/// Options for [`Platform::send`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Ask the platform to read the message aloud.
    pub speak_aloud: bool,
}

/// A reaction control attached to an interactive message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Identifier handed back to the interactive handler.
    pub id: String,
    /// What the platform shows (an emoji for reaction-based platforms).
    pub label: String,
}

impl Button {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// The operations the core requires from a chat platform.
///
/// Implementations report throttling as
/// [`PlatformError::RateLimited`](crate::PlatformError::RateLimited); the
/// framework retries those with backoff and treats everything else as final.
#[async_trait]
pub trait Platform: Send + Sync + 'static {
    /// The bot's own user, used to ignore its own messages and reactions.
    fn self_id(&self) -> Option<&UserId> {
        None
    }

    /// Posts a message and returns a reference to it.
    async fn send(
        &self,
        channel: &ChannelId,
        content: &str,
        options: &SendOptions,
    ) -> PlatformResult<MessageRef>;

    /// Replaces the content of a posted message.
    async fn edit(&self, message: &MessageRef, content: &str) -> PlatformResult<()>;

    /// Deletes a message.
    async fn delete(&self, message: &MessageRef) -> PlatformResult<()>;

    /// Attaches reaction controls to a message.
    ///
    /// The default implementation does nothing, for platforms whose
    /// interactive controls are implicit.
    async fn attach_controls(&self, _message: &MessageRef, _buttons: &[Button]) -> PlatformResult<()> {
        Ok(())
    }

    /// Removes all reaction controls from a message.
    ///
    /// The default implementation does nothing.
    async fn detach_controls(&self, _message: &MessageRef) -> PlatformResult<()> {
        Ok(())
    }
}

/// A shared platform trait object.
pub type BoxedPlatform = Arc<dyn Platform>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ref_display() {
        let message = MessageRef::new("general", "42");
        assert_eq!(message.to_string(), "general/42");
        assert_eq!(message.channel, ChannelId::new("general"));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&UserId::new("u1")).unwrap();
        assert_eq!(json, "\"u1\"");
    }
}
