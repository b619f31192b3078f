//! # Anvil
//!
//! A command blueprint matcher and reactive response dispatcher for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  events  ┌─────────┐  text  ┌────────────┐  Response  ┌────────────────┐
//! │ Platform │─────────▶│ Runtime │───────▶│ Dispatcher │───────────▶│ ResponseDriver │
//! └──────────┘          └─────────┘        └────────────┘            └────────────────┘
//!      ▲                     │ publish          │ match                      │ follow-ups
//!      │                     ▼                  ▼                            ▼
//!      │                ┌──────────┐      ┌───────────┐          ┌────────────────────┐
//!      └────────────────│ EventBus │      │ Blueprint │          │ InteractionRuntime │
//!     send/edit/delete  └──────────┘      └───────────┘          └────────────────────┘
//! ```
//!
//! - **Blueprints** describe every syntax a command accepts; the first variant
//!   that matches wins.
//! - **Handlers** receive an [`InvocationContext`](core::InvocationContext) and
//!   a [`MatchResult`](core::MatchResult) and return a [`Response`](framework::Response).
//! - The **response mode** decides what happens after the send: NORMAL, PERMANENT,
//!   EXPIRE, ACTIVE, INTERACTIVE or WAIT.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use anvil::prelude::*;
//!
//! async fn roll(_ctx: InvocationContext, matched: MatchResult) -> Result<Response, CommandError> {
//!     let sides: u32 = matched.arg(0).and_then(Capture::parse).unwrap_or(6);
//!     Ok(Response::new(format!("You rolled a {}", 1 + rand_below(sides))))
//! }
//!
//! let mut registry = CommandRegistry::new();
//! registry.register(
//!     Blueprint::new("roll", vec![Variant::new().arg(Arg::single("sides").optional())])?,
//!     roll,
//! )?;
//!
//! let runtime = AnvilRuntime::builder()
//!     .platform(platform)
//!     .commands(registry)
//!     .build()?;
//! runtime.run(events).await?;
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)* / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output
//! - `testing`: the in-memory `RecordingPlatform`

pub use anvil_core as core;
pub use anvil_framework as framework;
pub use anvil_runtime as runtime;

/// Commonly used types for writing commands and running a bot.
///
/// ```rust,ignore
/// use anvil::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use anvil_runtime::{AnvilConfig, AnvilRuntime};

    // Blueprints and matching
    pub use anvil_core::{
        Arg, Attachment, Blueprint, Capture, InvocationContext, MatchResult, Opt, Variant,
    };

    // Platform contract
    pub use anvil_core::{
        BoxedPlatform, Button, ChannelId, MessageRef, Platform, PlatformError, PlatformEvent,
        PlatformResult, SendOptions, UserId,
    };

    // Commands and responses
    pub use anvil_framework::{
        ActiveMessage, CommandError, CommandRegistry, Dispatcher, ExpireTarget, Interaction,
        InteractionResult, Response, ResponseMode, Shortcut, WaitSpec,
    };
}
