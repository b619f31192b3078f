//! # Anvil Core
//!
//! Data model and pure logic for the Anvil command core.
//!
//! This layer provides:
//! - [`Blueprint`]s: immutable descriptions of a command's accepted syntaxes
//! - The [`matcher`]: maps a blueprint plus raw tokens to a [`MatchResult`]
//! - [`InvocationContext`]: explicit per-invocation metadata handed to handlers
//! - The [`Platform`] trait: the send/edit/delete contract of a chat platform
//! - [`PlatformEvent`]: events the platform feeds back into the core
//!
//! Nothing in this crate spawns tasks or touches the network; dispatch and the
//! response state machine live in `anvil-framework`.

pub mod blueprint;
pub mod context;
pub mod error;
pub mod event;
pub mod matcher;
pub mod platform;
pub mod token;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use blueprint::{Arg, ArgCheck, ArgKind, Attachment, Blueprint, BlueprintBuilder, Opt, Variant};
pub use context::{Invocation, InvocationContext};
pub use error::{
    BlueprintError, BlueprintResult, MatchFailure, PlatformError, PlatformResult,
};
pub use event::{IncomingMessage, MessageEdit, PlatformEvent, ReactionEvent};
pub use matcher::{Capture, MatchResult, OptionValue, match_tokens, match_with_attachments};
pub use platform::{
    BoxedPlatform, Button, ChannelId, GuildId, MessageRef, Platform, SendOptions, UserId,
};
pub use token::{Token, TokenStream, tokenize};
