//! The response state machine.
//!
//! [`ResponseDriver::deliver`] sends a [`Response`] and enters its mode:
//!
//! | Mode | After the send |
//! |------|----------------|
//! | NORMAL | linked to the invocation in the [`EditStore`] for the retention window |
//! | PERMANENT | nothing |
//! | EXPIRE | invocation and/or response deleted after the delay, best effort |
//! | ACTIVE | handler runs as a tracked interaction |
//! | INTERACTIVE | controls attached; activations routed to the handler until stop or inactivity |
//! | WAIT | one event or timeout, then the handler runs exactly once |
//!
//! Only the initial send can fail the delivery. Everything afterwards is
//! follow-up work: logged, never surfaced.

use std::sync::Arc;
use std::time::Duration;

use anvil_core::{BoxedPlatform, Button, MessageRef, PlatformEvent, SendOptions, UserId};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span};

use crate::active::ActiveMessage;
use crate::editable::{EditStore, MemoryEditStore};
use crate::error::{DeliveryError, InteractionError, InteractionResult};
use crate::event_bus::{EventBus, PendingWait, Subscription, WaitSpec};
use crate::handler::{ActiveHandler, Interaction, InteractiveHandler, WaitHandler};
use crate::interaction::{FollowUp, InteractionKind, InteractionRuntime};
use crate::response::{ExpireTarget, Response, ResponseMode};
use crate::retry::RetryPolicy;

/// Timing settings for the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Minimum spacing between edits of one message.
    pub edit_interval: Duration,
    /// Inactivity timeout for INTERACTIVE responses without their own.
    pub interactive_timeout: Duration,
    /// Timeout for WAIT responses whose spec sets none.
    pub wait_timeout: Duration,
    /// How long a NORMAL response stays editable.
    pub edit_retention: Duration,
    pub retry: RetryPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            edit_interval: Duration::from_secs(1),
            interactive_timeout: Duration::from_secs(300),
            wait_timeout: Duration::from_secs(300),
            edit_retention: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// Where a response goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// A new message in the invocation's channel.
    New,
    /// Replace the content of an existing response.
    Existing(MessageRef),
}

/// A delivered response.
#[derive(Debug)]
pub struct Delivered {
    /// The response message.
    pub message: MessageRef,
    /// Follow-up work started for the mode, if any.
    pub follow_up: Option<FollowUp>,
}

/// Sends responses and drives their modes.
#[derive(Clone)]
pub struct ResponseDriver {
    platform: BoxedPlatform,
    interactions: InteractionRuntime,
    bus: EventBus,
    edits: Arc<dyn EditStore>,
    config: DriverConfig,
}

impl ResponseDriver {
    pub fn new(platform: BoxedPlatform, bus: EventBus) -> Self {
        Self {
            platform,
            interactions: InteractionRuntime::new(),
            bus,
            edits: Arc::new(MemoryEditStore::new()),
            config: DriverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_edit_store(mut self, store: Arc<dyn EditStore>) -> Self {
        self.edits = store;
        self
    }

    pub fn platform(&self) -> &BoxedPlatform {
        &self.platform
    }

    pub fn interactions(&self) -> &InteractionRuntime {
        &self.interactions
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn edits(&self) -> &Arc<dyn EditStore> {
        &self.edits
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Sends `response` as a new message for the invocation `invocation`.
    pub async fn deliver(
        &self,
        invocation: &MessageRef,
        response: Response,
    ) -> Result<Delivered, DeliveryError> {
        self.deliver_to(invocation, response, DeliveryTarget::New).await
    }

    /// Sends `response` to `target` and enters its mode.
    pub async fn deliver_to(
        &self,
        invocation: &MessageRef,
        response: Response,
        target: DeliveryTarget,
    ) -> Result<Delivered, DeliveryError> {
        let Response {
            content,
            mode,
            speak_aloud,
        } = response;
        // Registered before the send so a reply to the prompt is never missed.
        let mut pending_wait = match &mode {
            ResponseMode::Wait { spec, .. } => Some(self.bus.prepare_wait(spec.clone())),
            _ => None,
        };
        let message = self.send(invocation, &content, speak_aloud, target).await?;
        debug!(invocation = %invocation, message = %message, mode = mode.name(), "Response delivered");

        if mode.is_editable() {
            self.edits
                .insert(invocation.clone(), message.clone(), self.config.edit_retention)
                .await;
        } else {
            self.edits.remove(invocation).await;
        }

        let follow_up = match mode {
            ResponseMode::Normal | ResponseMode::Permanent => None,
            ResponseMode::Expire { after, target } => {
                let targets = match target {
                    ExpireTarget::Invocation => vec![invocation.clone()],
                    ExpireTarget::Response => vec![message.clone()],
                    ExpireTarget::Both => vec![invocation.clone(), message.clone()],
                };
                Some(self.schedule_expiry(after, targets))
            }
            ResponseMode::Active(handler) => Some(self.start_active(message.clone(), handler).await),
            ResponseMode::Interactive {
                buttons,
                handler,
                timeout,
            } => {
                let timeout = timeout.unwrap_or(self.config.interactive_timeout);
                Some(
                    self.start_interactive(message.clone(), buttons, handler, timeout)
                        .await,
                )
            }
            ResponseMode::Wait { spec, handler } => match pending_wait.take() {
                Some(pending) => Some(self.start_wait(message.clone(), &spec, pending, handler).await),
                None => None,
            },
        };

        Ok(Delivered { message, follow_up })
    }

    async fn send(
        &self,
        invocation: &MessageRef,
        content: &str,
        speak_aloud: bool,
        target: DeliveryTarget,
    ) -> Result<MessageRef, DeliveryError> {
        let platform = &self.platform;
        match target {
            DeliveryTarget::New => {
                let options = SendOptions { speak_aloud };
                let channel = &invocation.channel;
                self.config
                    .retry
                    .run("send", || platform.send(channel, content, &options))
                    .await
                    .map_err(|e| {
                        error!(channel = %channel, error = %e, "Failed to send response");
                        DeliveryError::Send(e)
                    })
            }
            DeliveryTarget::Existing(existing) => {
                // Whatever still drives the old response has released it
                // before the new content lands.
                if self.interactions.cancel_and_wait(&existing).await {
                    debug!(message = %existing, "Prior follow-up released for replacement");
                }
                self.config
                    .retry
                    .run("edit", || platform.edit(&existing, content))
                    .await
                    .map_err(|e| {
                        error!(message = %existing, error = %e, "Failed to replace response");
                        DeliveryError::Replace(e)
                    })?;
                Ok(existing)
            }
        }
    }

    fn active_message(&self, message: MessageRef, cancel: CancellationToken) -> ActiveMessage {
        ActiveMessage::new(
            self.platform.clone(),
            message,
            cancel,
            self.config.edit_interval,
            self.config.retry.clone(),
        )
    }

    // =========================================================================
    // EXPIRE
    // =========================================================================

    fn schedule_expiry(&self, after: Duration, targets: Vec<MessageRef>) -> FollowUp {
        let cancel = self.interactions.child_token();
        let finished = CancellationToken::new();
        let follow_up = FollowUp::new(finished.clone());
        let platform = self.platform.clone();
        let retry = self.config.retry.clone();

        tokio::spawn(async move {
            let _done = finished.drop_guard();
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Expiry cancelled");
                    return;
                }
                _ = tokio::time::sleep(after) => {}
            }
            for target in &targets {
                if let Err(e) = retry.run("delete", || platform.delete(target)).await {
                    debug!(message = %target, error = %e, "Expired message already gone");
                }
            }
        });

        follow_up
    }

    // =========================================================================
    // ACTIVE
    // =========================================================================

    async fn start_active(&self, message: MessageRef, handler: Arc<dyn ActiveHandler>) -> FollowUp {
        let driver = self.clone();
        let span = info_span!("active", message = %message);
        self.interactions
            .start(message.clone(), InteractionKind::Active, move |cancel| {
                let active = driver.active_message(message, cancel);
                async move { handler.run(active).await }.instrument(span)
            })
            .await
    }

    // =========================================================================
    // INTERACTIVE
    // =========================================================================

    async fn start_interactive(
        &self,
        message: MessageRef,
        buttons: Vec<Button>,
        handler: Arc<dyn InteractiveHandler>,
        timeout: Duration,
    ) -> FollowUp {
        let driver = self.clone();
        let span = info_span!("interactive", message = %message);
        self.interactions
            .start(message.clone(), InteractionKind::Interactive, move |cancel| {
                let controls = driver.subscribe_controls(&message, &buttons);
                let active = driver.active_message(message, cancel.clone());
                async move {
                    driver
                        .run_interactive(active, buttons, controls, handler, timeout, cancel)
                        .await
                }
                .instrument(span)
            })
            .await
    }

    /// Subscribes to activations of `buttons` on `message` by anyone but the
    /// bot itself.
    fn subscribe_controls(&self, message: &MessageRef, buttons: &[Button]) -> Subscription {
        let message = message.clone();
        let ids: Vec<String> = buttons.iter().map(|b| b.id.clone()).collect();
        let own_id: Option<UserId> = self.platform.self_id().cloned();
        self.bus.subscribe("reaction_add", move |event: &PlatformEvent| {
            event.as_reaction().is_some_and(|reaction| {
                reaction.message == message
                    && own_id.as_ref() != Some(&reaction.user)
                    && ids.contains(&reaction.control)
            })
        })
    }

    async fn run_interactive(
        &self,
        active: ActiveMessage,
        buttons: Vec<Button>,
        mut controls: Subscription,
        handler: Arc<dyn InteractiveHandler>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> InteractionResult<()> {
        let message = active.message().clone();
        self.platform.attach_controls(&message, &buttons).await?;

        let outcome = loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break Err(InteractionError::Cancelled),
                _ = tokio::time::sleep(timeout) => {
                    debug!(timeout = ?timeout, "Interactive response went idle");
                    break Ok(());
                }
                event = controls.recv() => event,
            };
            let Some(PlatformEvent::ReactionAdd(reaction)) = event else {
                break Ok(());
            };
            match handler.on_control(reaction, active.clone()).await {
                Ok(Interaction::Continue) => {}
                Ok(Interaction::Stop) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        drop(controls);

        if let Err(e) = self.platform.detach_controls(&message).await {
            debug!(error = %e, "Failed to detach controls");
        }
        outcome
    }

    // =========================================================================
    // WAIT
    // =========================================================================

    async fn start_wait(
        &self,
        message: MessageRef,
        spec: &WaitSpec,
        pending: PendingWait,
        handler: Arc<dyn WaitHandler>,
    ) -> FollowUp {
        let driver = self.clone();
        let default_timeout = self.config.wait_timeout;
        let span = info_span!("wait", message = %message, event = spec.event());
        self.interactions
            .start(message.clone(), InteractionKind::Wait, move |cancel| {
                let active = driver.active_message(message, cancel.clone());
                async move {
                    let event = pending.wait(default_timeout, &cancel).await;
                    if event.is_none() {
                        debug!("Wait settled without an event");
                    }
                    handler.on_result(event, active).await
                }
                .instrument(span)
            })
            .await
    }
}

impl std::fmt::Debug for ResponseDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseDriver")
            .field("config", &self.config)
            .field("pending", &self.interactions.len())
            .finish_non_exhaustive()
    }
}
