//! Handler traits.
//!
//! Every handler trait has a blanket implementation for async closures, so
//! most commands are registered as plain closures:
//!
//! ```rust,ignore
//! registry.register(blueprint, |ctx: InvocationContext, matched: MatchResult| async move {
//!     Ok(Response::permanent(format!("hello {}", ctx.author)))
//! })?;
//!
//! let marquee = Response::active("Starting...", |message: ActiveMessage| async move {
//!     for tick in 1..=3 {
//!         message.edit(format!("tick {tick}")).await?;
//!     }
//!     Ok(())
//! });
//! ```

use std::future::Future;

use anvil_core::{InvocationContext, MatchResult, PlatformEvent, ReactionEvent};
use async_trait::async_trait;

use crate::active::ActiveMessage;
use crate::error::{CommandError, InteractionResult};
use crate::response::Response;

// ============================================================================
// Command handlers
// ============================================================================

/// Produces the response for a matched invocation.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn call(
        &self,
        ctx: InvocationContext,
        matched: MatchResult,
    ) -> Result<Response, CommandError>;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(InvocationContext, MatchResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, CommandError>> + Send + 'static,
{
    async fn call(
        &self,
        ctx: InvocationContext,
        matched: MatchResult,
    ) -> Result<Response, CommandError> {
        self(ctx, matched).await
    }
}

// ============================================================================
// Follow-up handlers
// ============================================================================

/// Drives an ACTIVE response until it returns or is cancelled.
#[async_trait]
pub trait ActiveHandler: Send + Sync + 'static {
    async fn run(&self, message: ActiveMessage) -> InteractionResult<()>;
}

#[async_trait]
impl<F, Fut> ActiveHandler for F
where
    F: Fn(ActiveMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = InteractionResult<()>> + Send + 'static,
{
    async fn run(&self, message: ActiveMessage) -> InteractionResult<()> {
        self(message).await
    }
}

/// What an interactive response does after handling a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// Keep listening for controls.
    Continue,
    /// End the interaction and remove the controls.
    Stop,
}

/// Reacts to controls activated on an INTERACTIVE response.
#[async_trait]
pub trait InteractiveHandler: Send + Sync + 'static {
    async fn on_control(
        &self,
        reaction: ReactionEvent,
        message: ActiveMessage,
    ) -> InteractionResult<Interaction>;
}

#[async_trait]
impl<F, Fut> InteractiveHandler for F
where
    F: Fn(ReactionEvent, ActiveMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = InteractionResult<Interaction>> + Send + 'static,
{
    async fn on_control(
        &self,
        reaction: ReactionEvent,
        message: ActiveMessage,
    ) -> InteractionResult<Interaction> {
        self(reaction, message).await
    }
}

/// Receives the outcome of a WAIT response: the event, or `None` on timeout
/// or cancellation. Called exactly once.
#[async_trait]
pub trait WaitHandler: Send + Sync + 'static {
    async fn on_result(
        &self,
        event: Option<PlatformEvent>,
        message: ActiveMessage,
    ) -> InteractionResult<()>;
}

#[async_trait]
impl<F, Fut> WaitHandler for F
where
    F: Fn(Option<PlatformEvent>, ActiveMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = InteractionResult<()>> + Send + 'static,
{
    async fn on_result(
        &self,
        event: Option<PlatformEvent>,
        message: ActiveMessage,
    ) -> InteractionResult<()> {
        self(event, message).await
    }
}
