//! # Anvil Framework
//!
//! Dispatch and post-send behaviour for the Anvil command core.
//!
//! This layer provides:
//! - [`CommandRegistry`]: command blueprints, handlers and shortcuts, built once
//!   at startup
//! - [`Dispatcher`]: resolves invocation text to a command, matches it and runs
//!   the handler, turning every failure into a [`Response`]
//! - [`ResponseDriver`]: the response state machine that sends a response and
//!   drives its mode (editable, permanent, expiring, active, interactive, wait)
//! - [`InteractionRuntime`]: owns outstanding follow-ups, one per message, with
//!   cooperative cancel-and-replace
//! - [`EventBus`]: named event listeners and one-shot waits fed by the platform
//! - [`lifecycle`]: the framework's own events (ready, command, response, exceptions)
//!
//! ```rust,ignore
//! let mut registry = CommandRegistry::new();
//! registry.register(blueprint, |ctx: InvocationContext, matched: MatchResult| async move {
//!     Ok(Response::new(format!("matched variant {}", matched.variant_index)))
//! })?;
//!
//! let dispatcher = Dispatcher::new(registry);
//! if let Some(response) = dispatcher.dispatch(&invocation).await {
//!     driver.deliver(&invocation.message, response).await?;
//! }
//! ```

pub mod active;
pub mod delivery;
pub mod dispatcher;
pub mod editable;
pub mod error;
pub mod event_bus;
pub mod handler;
pub mod interaction;
pub mod lifecycle;
pub mod registry;
pub mod response;
pub mod retry;

pub use active::ActiveMessage;
pub use delivery::{Delivered, DeliveryTarget, DriverConfig, ResponseDriver};
pub use dispatcher::{
    AccessPolicy, AllowAll, Dispatcher, FaultReporter, HandlerFault, INTERNAL_ERROR_MESSAGE,
    LogReporter,
};
pub use editable::{EditStore, MemoryEditStore};
pub use error::{
    CommandError, DeliveryError, InteractionError, InteractionResult, RegistryError,
    RegistryResult,
};
pub use event_bus::{EventBus, EventListener, EventPredicate, PendingWait, Subscription, WaitSpec};
pub use handler::{ActiveHandler, CommandHandler, Interaction, InteractiveHandler, WaitHandler};
pub use interaction::{FollowUp, InteractionKind, InteractionRuntime};
pub use lifecycle::{
    CommandEvent, ExceptionEvent, FaultEvent, LifecycleEvent, ReadyEvent, ResponseEvent,
};
pub use registry::{CommandEntry, CommandRegistry, Resolved, Shortcut};
pub use response::{ExpireTarget, Response, ResponseMode};
pub use retry::RetryPolicy;

pub use tower::BoxError;
