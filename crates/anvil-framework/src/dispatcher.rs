//! Invocation dispatch.
//!
//! [`Dispatcher::dispatch`] turns one invocation into at most one
//! [`Response`]:
//!
//! 1. The leading word is resolved to a command, expanding shortcuts
//! 2. The [`AccessPolicy`] is consulted
//! 3. The arguments are matched against the command's blueprint
//! 4. The handler runs with the [`InvocationContext`] and [`MatchResult`]
//!
//! Every failure along the way becomes a PERMANENT response. Syntax and
//! validation failures carry their display message; handler faults (internal
//! errors and panics) carry [`INTERNAL_ERROR_MESSAGE`] and are handed to the
//! [`FaultReporter`].
//!
//! With an event bus attached, each step is also published as a
//! [lifecycle](crate::lifecycle) event.

use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use anvil_core::{Blueprint, Invocation, InvocationContext, MatchResult, match_with_attachments};
use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Service};
use tracing::{Instrument, Level, debug, error, span};

use crate::error::CommandError;
use crate::event_bus::EventBus;
use crate::lifecycle::{CommandEvent, ExceptionEvent, FaultEvent, LifecycleEvent, ResponseEvent};
use crate::registry::CommandRegistry;
use crate::response::Response;

/// What users see when a handler fails unexpectedly.
pub const INTERNAL_ERROR_MESSAGE: &str =
    "Something went wrong while running that command. The error has been reported.";

// =============================================================================
// Collaborators
// =============================================================================

/// Decides whether an invocation may run its command.
pub trait AccessPolicy: Send + Sync + 'static {
    /// `Err(message)` denies the invocation and shows `message`.
    fn check(&self, ctx: &InvocationContext, blueprint: &Blueprint) -> Result<(), String>;
}

/// Lets everything through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn check(&self, _ctx: &InvocationContext, _blueprint: &Blueprint) -> Result<(), String> {
        Ok(())
    }
}

impl<F> AccessPolicy for F
where
    F: Fn(&InvocationContext, &Blueprint) -> Result<(), String> + Send + Sync + 'static,
{
    fn check(&self, ctx: &InvocationContext, blueprint: &Blueprint) -> Result<(), String> {
        self(ctx, blueprint)
    }
}

/// An unexpected handler failure.
#[derive(Debug)]
pub enum HandlerFault {
    Internal(BoxError),
    Panic(String),
}

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{e}"),
            Self::Panic(message) => write!(f, "handler panicked: {message}"),
        }
    }
}

/// Receives handler faults with their full detail.
pub trait FaultReporter: Send + Sync + 'static {
    fn report(&self, ctx: &InvocationContext, fault: &HandlerFault);
}

/// Reports faults through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl FaultReporter for LogReporter {
    fn report(&self, ctx: &InvocationContext, fault: &HandlerFault) {
        error!(
            command = %ctx.base,
            author = %ctx.author,
            message = %ctx.message,
            content = %ctx.cleaned_content,
            "Command handler fault: {fault}"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Resolves, matches and runs invocations.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    access: Arc<dyn AccessPolicy>,
    reporter: Arc<dyn FaultReporter>,
    events: Option<EventBus>,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            access: Arc::new(AllowAll),
            reporter: Arc::new(LogReporter),
            events: None,
        }
    }

    /// Publishes lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn with_access_policy(mut self, policy: impl AccessPolicy) -> Self {
        self.access = Arc::new(policy);
        self
    }

    pub fn with_fault_reporter(mut self, reporter: impl FaultReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    async fn emit(&self, event: impl LifecycleEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event.into_event()).await;
        }
    }

    /// Publishes a refusal and turns it into the PERMANENT response shown.
    async fn refuse(&self, invocation: &Invocation, command: Option<&str>, reason: String) -> Response {
        self.emit(ExceptionEvent {
            command: command.map(str::to_string),
            author: invocation.author.clone(),
            message: invocation.message.clone(),
            reason: reason.clone(),
        })
        .await;
        Response::permanent(reason)
    }

    async fn fault(&self, ctx: &InvocationContext, fault: HandlerFault) -> Response {
        self.reporter.report(ctx, &fault);
        self.emit(FaultEvent {
            command: ctx.base.clone(),
            author: ctx.author.clone(),
            message: ctx.message.clone(),
            error: fault.to_string(),
        })
        .await;
        Response::permanent(INTERNAL_ERROR_MESSAGE)
    }

    /// Runs one invocation.
    ///
    /// Returns `None` if the leading word names no command or shortcut.
    pub async fn dispatch(&self, invocation: &Invocation) -> Option<Response> {
        let resolved = match self.registry.resolve(&invocation.text)? {
            Ok(resolved) => resolved,
            Err(failure) => {
                debug!(text = %invocation.text, reason = %failure, "Shortcut arguments did not match");
                return Some(self.refuse(invocation, None, failure.display_message()).await);
            }
        };
        let entry = resolved.entry;
        let blueprint = entry.blueprint();

        let span = span!(
            Level::DEBUG,
            "dispatch",
            command = blueprint.name(),
            author = %invocation.author
        );

        let ctx = InvocationContext {
            author: invocation.author.clone(),
            guild: invocation.guild.clone(),
            message: invocation.message.clone(),
            base: blueprint.name().to_string(),
            shortcut: resolved.shortcut.map(str::to_string),
            keywords: blueprint.keywords().clone(),
            cleaned_content: resolved.content,
            attachments: invocation.attachments.clone(),
        };
        let arguments = resolved.arguments;
        let attachments = invocation.attachments.len();

        let command = Some(blueprint.name());

        async move {
            if let Err(message) = self.access.check(&ctx, blueprint) {
                debug!("Access denied");
                return Some(self.refuse(invocation, command, message).await);
            }

            let matched: MatchResult = match match_with_attachments(blueprint, &arguments, attachments) {
                Ok(matched) => matched,
                Err(failure) => {
                    debug!(reason = %failure, "Invocation did not match");
                    return Some(self.refuse(invocation, command, failure.display_message()).await);
                }
            };
            debug!(variant = matched.variant_index, "Invocation matched");
            self.emit(CommandEvent {
                command: ctx.base.clone(),
                shortcut: ctx.shortcut.clone(),
                author: ctx.author.clone(),
                message: ctx.message.clone(),
                variant: matched.variant_index,
                content: ctx.cleaned_content.clone(),
            })
            .await;

            let outcome = AssertUnwindSafe(entry.handler().call(ctx.clone(), matched))
                .catch_unwind()
                .await;
            let response = match outcome {
                Ok(Ok(response)) => response,
                Ok(Err(CommandError::User(message))) => {
                    debug!(reason = %message, "Command rejected the invocation");
                    return Some(self.refuse(invocation, command, message).await);
                }
                Ok(Err(CommandError::Internal(e))) => {
                    return Some(self.fault(&ctx, HandlerFault::Internal(e)).await);
                }
                Err(payload) => {
                    let fault = HandlerFault::Panic(panic_message(&*payload));
                    return Some(self.fault(&ctx, fault).await);
                }
            };

            self.emit(ResponseEvent {
                command: ctx.base.clone(),
                author: ctx.author.clone(),
                message: ctx.message.clone(),
                mode: response.mode.name().to_string(),
                content: response.content.clone(),
            })
            .await;
            Some(response)
        }
        .instrument(span)
        .await
    }

    /// Describes a command: its description, then one usage line per
    /// variant with the variant's doc. Hidden commands have no help.
    pub fn help(&self, name: &str) -> Option<String> {
        let entry = self.registry.get(name)?;
        let blueprint = entry.blueprint();
        if blueprint.is_hidden() {
            return None;
        }

        let mut text = format!("**{}**", blueprint.name());
        if !blueprint.description().is_empty() {
            text.push_str(": ");
            text.push_str(blueprint.description());
        }
        for variant in blueprint.variants() {
            text.push_str("\n`");
            text.push_str(&variant.usage(blueprint.name()));
            text.push('`');
            if let Some(doc) = variant.get_doc() {
                text.push_str(" - ");
                text.push_str(doc);
            }
        }
        if !entry.shortcuts().is_empty() {
            text.push_str("\nShortcuts: ");
            text.push_str(&entry.shortcuts().join(", "));
        }
        Some(text)
    }

    /// Names of every command shown in help listings.
    pub fn visible_commands(&self) -> Vec<&str> {
        self.registry
            .commands()
            .map(|entry| entry.blueprint())
            .filter(|blueprint| !blueprint.is_hidden())
            .map(Blueprint::name)
            .collect()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Dispatch as a `tower` service, so middleware can wrap it.
impl Service<Invocation> for Dispatcher {
    type Response = Option<Response>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { Ok(dispatcher.dispatch(&invocation).await) })
    }
}
