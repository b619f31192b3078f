//! Invocation metadata.
//!
//! There is no ambient bot object: everything a handler may need about the
//! invocation is carried by value in an [`InvocationContext`].

use std::collections::BTreeSet;

use crate::event::IncomingMessage;
use crate::platform::{ChannelId, GuildId, MessageRef, UserId};

/// One command invocation as received, before matching.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub author: UserId,
    pub guild: Option<GuildId>,
    /// The message that issued the command.
    pub message: MessageRef,
    /// Invocation text with the invoker prefix already removed.
    pub text: String,
    pub attachments: Vec<String>,
}

impl Invocation {
    pub fn new(author: impl Into<UserId>, message: MessageRef, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            guild: None,
            message,
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Builds an invocation from a platform message and its command text.
    pub fn from_message(message: &IncomingMessage, text: impl Into<String>) -> Self {
        Self {
            author: message.author.clone(),
            guild: message.guild.clone(),
            message: message.message.clone(),
            text: text.into(),
            attachments: message.attachments.clone(),
        }
    }

    pub fn with_guild(mut self, guild: impl Into<GuildId>) -> Self {
        self.guild = Some(guild.into());
        self
    }

    pub fn with_attachment(mut self, attachment: impl Into<String>) -> Self {
        self.attachments.push(attachment.into());
        self
    }

    pub fn channel(&self) -> &ChannelId {
        &self.message.channel
    }
}

/// Per-invocation metadata handed to command handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationContext {
    pub author: UserId,
    pub guild: Option<GuildId>,
    /// The message that issued the command.
    pub message: MessageRef,
    /// The resolved command name.
    pub base: String,
    /// The shortcut that was expanded into this invocation, if any.
    pub shortcut: Option<String>,
    /// Every option keyword declared by the command's blueprint.
    pub keywords: BTreeSet<String>,
    /// The invocation text after shortcut expansion.
    pub cleaned_content: String,
    pub attachments: Vec<String>,
}

impl InvocationContext {
    pub fn channel(&self) -> &ChannelId {
        &self.message.channel
    }
}
