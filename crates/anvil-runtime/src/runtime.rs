//! The event loop.
//!
//! [`AnvilRuntime`] consumes [`PlatformEvent`]s, publishes each one on the
//! event bus, and turns invoker-prefixed messages into dispatched and
//! delivered responses. Edits of a recent command message re-run it and
//! update the response it produced.
//!
//! The dispatcher shares the runtime's bus, so listeners see the framework's
//! lifecycle events next to platform ones. [`ReadyEvent`] goes out once,
//! before the first event is handled.
//!
//! ```rust,ignore
//! use anvil_runtime::AnvilRuntime;
//!
//! let runtime = AnvilRuntime::builder()
//!     .config_file("anvil.toml")
//!     .platform(platform)
//!     .commands(registry)
//!     .build()?;
//!
//! runtime.run(events).await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anvil_core::{BoxedPlatform, IncomingMessage, Invocation, PlatformEvent, UserId};
use anvil_framework::{
    CommandRegistry, Delivered, DeliveryTarget, Dispatcher, EditStore, EventBus, LifecycleEvent,
    ReadyEvent, ResponseDriver,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::config::{AnvilConfig, ConfigLoader, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

struct Inner {
    config: AnvilConfig,
    dispatcher: Dispatcher,
    driver: ResponseDriver,
    self_id: Option<UserId>,
    tasks: TaskTracker,
    booted: AtomicBool,
}

/// Wires platform events to the dispatcher and the response state machine.
#[derive(Clone)]
pub struct AnvilRuntime {
    inner: Arc<Inner>,
}

impl AnvilRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Assembles a runtime from already validated parts.
    ///
    /// Does not touch logging; see [`RuntimeBuilder`] for that.
    pub fn new(platform: BoxedPlatform, dispatcher: Dispatcher, config: AnvilConfig) -> Self {
        let driver = ResponseDriver::new(platform, EventBus::new()).with_config(config.driver_config());
        Self::from_driver(driver, dispatcher, config)
    }

    fn from_driver(driver: ResponseDriver, dispatcher: Dispatcher, config: AnvilConfig) -> Self {
        let self_id = config
            .bot
            .self_id
            .clone()
            .map(UserId::new)
            .or_else(|| driver.platform().self_id().cloned());
        let dispatcher = dispatcher.with_event_bus(driver.bus().clone());
        info!(
            invoker = %config.bot.invoker,
            commands = dispatcher.registry().len(),
            self_id = ?self_id,
            "Runtime initialized"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                dispatcher,
                driver,
                self_id,
                tasks: TaskTracker::new(),
                booted: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &AnvilConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn driver(&self) -> &ResponseDriver {
        &self.inner.driver
    }

    /// The bus every incoming event is published on.
    pub fn bus(&self) -> &EventBus {
        self.inner.driver.bus()
    }

    /// The invocation carried by `message`, if it addresses the bot.
    ///
    /// Messages from the bot itself and messages without the invoker prefix
    /// (or with nothing after it) yield `None`.
    pub fn invocation_for(&self, message: &IncomingMessage) -> Option<Invocation> {
        if self.inner.self_id.as_ref() == Some(&message.author) {
            return None;
        }
        let text = message
            .content
            .trim_start()
            .strip_prefix(self.inner.config.bot.invoker.as_str())?
            .trim();
        if text.is_empty() {
            return None;
        }
        Some(Invocation::from_message(message, text))
    }

    /// Handles one event to completion.
    ///
    /// Returns the delivered response if the event produced one. Follow-up
    /// work of the response keeps running after this returns.
    pub async fn handle_event(&self, event: PlatformEvent) -> RuntimeResult<Option<Delivered>> {
        self.bus().publish(event.clone()).await;
        match event {
            PlatformEvent::Message(message) => self.invoke(&message).await,
            PlatformEvent::MessageEdit(edit) => self.redispatch(&edit.after).await,
            _ => Ok(None),
        }
    }

    async fn invoke(&self, message: &IncomingMessage) -> RuntimeResult<Option<Delivered>> {
        let Some(invocation) = self.invocation_for(message) else {
            return Ok(None);
        };
        let Some(response) = self.inner.dispatcher.dispatch(&invocation).await else {
            trace!(text = %invocation.text, "No command matched");
            return Ok(None);
        };
        let delivered = self.inner.driver.deliver(&invocation.message, response).await?;
        Ok(Some(delivered))
    }

    /// Re-runs an edited command whose NORMAL response is still editable.
    ///
    /// A NORMAL result replaces the old response's content. Any other mode
    /// deletes the old response and is delivered as a new message.
    async fn redispatch(&self, message: &IncomingMessage) -> RuntimeResult<Option<Delivered>> {
        let driver = &self.inner.driver;
        let Some(previous) = driver.edits().get(&message.message).await else {
            trace!(message = %message.message, "Edited message has no editable response");
            return Ok(None);
        };
        let Some(invocation) = self.invocation_for(message) else {
            return Ok(None);
        };
        let Some(response) = self.inner.dispatcher.dispatch(&invocation).await else {
            return Ok(None);
        };

        let target = if response.mode.is_editable() {
            DeliveryTarget::Existing(previous)
        } else {
            driver.edits().remove(&message.message).await;
            let platform = driver.platform();
            if let Err(e) = driver
                .config()
                .retry
                .run("delete", || platform.delete(&previous))
                .await
            {
                debug!(message = %previous, error = %e, "Failed to delete replaced response");
            }
            DeliveryTarget::New
        };
        debug!(invocation = %invocation.message, target = ?target, "Re-dispatching edited command");

        let delivered = driver.deliver_to(&invocation.message, response, target).await?;
        Ok(Some(delivered))
    }

    /// Publishes [`ReadyEvent`] on the bus. Only the first call does anything.
    pub async fn announce_ready(&self) {
        if self.inner.booted.swap(true, Ordering::SeqCst) {
            return;
        }
        let commands: Vec<String> = self
            .inner
            .dispatcher
            .registry()
            .commands()
            .map(|entry| entry.blueprint().name().to_string())
            .collect();
        debug!(commands = commands.len(), "Announcing ready");
        let ready = ReadyEvent {
            self_id: self.inner.self_id.clone(),
            invoker: self.inner.config.bot.invoker.clone(),
            commands,
        };
        self.bus().publish(ready.into_event()).await;
    }

    /// Handles `event` on a tracked background task.
    pub fn spawn_event(&self, event: PlatformEvent) {
        let runtime = self.clone();
        let span = info_span!("event", kind = %event.name());
        self.inner.tasks.spawn(
            async move {
                if let Err(e) = runtime.handle_event(event).await {
                    error!(error = %e, "Failed to handle event");
                }
            }
            .instrument(span),
        );
    }

    /// Runs until Ctrl+C, SIGTERM or the end of `events`, then shuts down.
    pub async fn run(&self, events: mpsc::Receiver<PlatformEvent>) -> RuntimeResult<()> {
        info!("Anvil runtime is now running. Press Ctrl+C to stop.");
        self.run_until(events, wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes or `events` ends, then shuts down.
    pub async fn run_until<F>(
        &self,
        mut events: mpsc::Receiver<PlatformEvent>,
        shutdown: F,
    ) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.announce_ready().await;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = events.recv() => match event {
                    Some(event) => self.spawn_event(event),
                    None => {
                        info!("Event stream closed");
                        break;
                    }
                },
            }
        }
        self.shutdown().await;
        Ok(())
    }

    /// Cancels every follow-up and waits for in-flight events to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down Anvil runtime");
        let interactions = self.inner.driver.interactions();
        interactions.shutdown().await;
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        // Interactions started while draining were born cancelled.
        interactions.shutdown().await;
        info!("Runtime stopped");
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for an [`AnvilRuntime`] with loaded configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<AnvilConfig>,
    platform: Option<BoxedPlatform>,
    dispatcher: Option<Dispatcher>,
    edit_store: Option<Arc<dyn EditStore>>,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir().with_user_config_dir(),
            config: None,
            platform: None,
            dispatcher: None,
            edit_store: None,
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Uses `config` as is instead of loading one.
    pub fn config(mut self, config: AnvilConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn platform(mut self, platform: BoxedPlatform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Dispatches to `registry` with the default access policy and reporter.
    pub fn commands(mut self, registry: CommandRegistry) -> Self {
        self.dispatcher = Some(Dispatcher::new(registry));
        self
    }

    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Replaces the in-memory store of editable responses.
    pub fn edit_store(mut self, store: Arc<dyn EditStore>) -> Self {
        self.edit_store = Some(store);
        self
    }

    /// Whether `build` installs the global tracing subscriber (default: true).
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    pub fn build(self) -> RuntimeResult<AnvilRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load_validated()?,
        };
        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let platform = self.platform.ok_or(RuntimeError::MissingPlatform)?;
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Dispatcher::new(CommandRegistry::new()));
        let mut driver =
            ResponseDriver::new(platform, EventBus::new()).with_config(config.driver_config());
        if let Some(store) = self.edit_store {
            driver = driver.with_edit_store(store);
        }
        Ok(AnvilRuntime::from_driver(driver, dispatcher, config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anvil_core::testing::RecordingPlatform;
    use anvil_core::{Arg, Blueprint, InvocationContext, MatchResult, MessageEdit, MessageRef, Variant};
    use anvil_framework::{CommandError, Response, WaitSpec};
    use tokio::time::Instant;

    async fn echo(_ctx: InvocationContext, matched: MatchResult) -> Result<Response, CommandError> {
        Ok(Response::new(matched.arg_str(0).unwrap_or_default()))
    }

    async fn shout(_ctx: InvocationContext, matched: MatchResult) -> Result<Response, CommandError> {
        let text = matched.arg_str(0).unwrap_or_default().to_uppercase();
        Ok(Response::permanent(text))
    }

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                Blueprint::new("echo", vec![Variant::new().arg(Arg::merged("text"))]).unwrap(),
                echo,
            )
            .unwrap();
        registry
            .register(
                Blueprint::new("shout", vec![Variant::new().arg(Arg::merged("text"))]).unwrap(),
                shout,
            )
            .unwrap();
        registry
    }

    fn runtime(platform: Arc<RecordingPlatform>) -> AnvilRuntime {
        AnvilRuntime::builder()
            .config(AnvilConfig::default())
            .init_logging(false)
            .platform(platform)
            .commands(registry())
            .build()
            .unwrap()
    }

    fn message(author: &str, id: &str, content: &str) -> IncomingMessage {
        IncomingMessage {
            message: MessageRef::new("c1", id),
            author: UserId::new(author),
            guild: None,
            content: content.to_string(),
            attachments: Vec::new(),
        }
    }

    fn edited(id: &str, before: &str, after: &str) -> PlatformEvent {
        PlatformEvent::MessageEdit(MessageEdit {
            before: message("u1", id, before),
            after: message("u1", id, after),
        })
    }

    #[tokio::test]
    async fn test_dispatches_prefixed_messages() {
        let platform = RecordingPlatform::with_self_id("bot");
        let runtime = runtime(platform.clone());

        let delivered = runtime
            .handle_event(PlatformEvent::Message(message("u1", "m1", "!echo hello  there")))
            .await
            .unwrap();
        assert!(delivered.is_some());
        assert_eq!(platform.sent(), vec!["hello  there".to_string()]);
    }

    #[tokio::test]
    async fn test_ignores_unaddressed_and_own_messages() {
        let platform = RecordingPlatform::with_self_id("bot");
        let runtime = runtime(platform.clone());

        for event in [
            message("u1", "m1", "echo no prefix"),
            message("u1", "m2", "!"),
            message("u1", "m3", "!unknown command"),
            message("bot", "m4", "!echo loop"),
        ] {
            let delivered = runtime.handle_event(PlatformEvent::Message(event)).await.unwrap();
            assert!(delivered.is_none());
        }
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_configured_invoker_and_self_id() {
        let platform = RecordingPlatform::new();
        let mut config = AnvilConfig::default();
        config.bot.invoker = "?".to_string();
        config.bot.self_id = Some("me".to_string());
        let runtime = AnvilRuntime::new(platform.clone(), Dispatcher::new(registry()), config);

        assert!(runtime.invocation_for(&message("u1", "m1", "!echo hi")).is_none());
        assert!(runtime.invocation_for(&message("me", "m1", "?echo hi")).is_none());
        let invocation = runtime.invocation_for(&message("u1", "m1", "  ?echo hi ")).unwrap();
        assert_eq!(invocation.text, "echo hi");
    }

    #[tokio::test]
    async fn test_edit_updates_normal_response_in_place() {
        let platform = RecordingPlatform::new();
        let runtime = runtime(platform.clone());

        let first = runtime
            .handle_event(PlatformEvent::Message(message("u1", "m1", "!echo hi")))
            .await
            .unwrap()
            .unwrap();
        let second = runtime
            .handle_event(edited("m1", "!echo hi", "!echo bye"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.message, first.message);
        assert_eq!(platform.sent(), vec!["hi".to_string()]);
        assert_eq!(platform.edits_of(&first.message), vec!["bye".to_string()]);
    }

    #[tokio::test]
    async fn test_edit_into_other_mode_replaces_response() {
        let platform = RecordingPlatform::new();
        let runtime = runtime(platform.clone());

        let first = runtime
            .handle_event(PlatformEvent::Message(message("u1", "m1", "!echo hi")))
            .await
            .unwrap()
            .unwrap();
        let second = runtime
            .handle_event(edited("m1", "!echo hi", "!shout hi"))
            .await
            .unwrap()
            .unwrap();

        assert_ne!(second.message, first.message);
        assert_eq!(platform.deleted(), vec![first.message]);
        assert_eq!(platform.sent(), vec!["hi".to_string(), "HI".to_string()]);

        // The permanent response is no longer linked to the invocation.
        let again = runtime
            .handle_event(edited("m1", "!shout hi", "!echo again"))
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_edit_of_unknown_message_is_ignored() {
        let platform = RecordingPlatform::new();
        let runtime = runtime(platform.clone());

        let delivered = runtime
            .handle_event(edited("m9", "hello", "!echo hello"))
            .await
            .unwrap();
        assert!(delivered.is_none());
        assert!(platform.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_after_retention_is_ignored() {
        let platform = RecordingPlatform::new();
        let runtime = runtime(platform.clone());

        runtime
            .handle_event(PlatformEvent::Message(message("u1", "m1", "!echo hi")))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;

        let delivered = runtime
            .handle_event(edited("m1", "!echo hi", "!echo late"))
            .await
            .unwrap();
        assert!(delivered.is_none());
    }

    #[tokio::test]
    async fn test_events_reach_the_bus() {
        let platform = RecordingPlatform::new();
        let runtime = runtime(platform.clone());
        let pending = runtime.bus().prepare_wait(WaitSpec::any("message"));

        runtime
            .handle_event(PlatformEvent::Message(message("u1", "m1", "just chatting")))
            .await
            .unwrap();

        let event = pending
            .wait(Duration::from_secs(1), &Default::default())
            .await
            .unwrap();
        assert_eq!(event.author(), Some(&UserId::new("u1")));
    }

    #[tokio::test]
    async fn test_initial_send_failure_is_reported() {
        let platform = RecordingPlatform::new();
        platform.fail_next_send(anvil_core::PlatformError::Forbidden("no access".into()));
        let runtime = runtime(platform.clone());

        let result = runtime
            .handle_event(PlatformEvent::Message(message("u1", "m1", "!echo hi")))
            .await;
        assert!(matches!(result, Err(RuntimeError::Delivery(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_drains_events() {
        let platform = RecordingPlatform::new();
        let runtime = runtime(platform.clone());
        let (tx, rx) = mpsc::channel(8);

        tx.send(PlatformEvent::Message(message("u1", "m1", "!echo one")))
            .await
            .unwrap();
        tx.send(PlatformEvent::Message(message("u1", "m2", "!echo two")))
            .await
            .unwrap();
        drop(tx);

        runtime
            .run_until(rx, std::future::pending())
            .await
            .unwrap();

        let mut sent = platform.sent();
        sent.sort();
        assert_eq!(sent, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_follow_ups() {
        let platform = RecordingPlatform::new();
        let mut registry = CommandRegistry::new();
        registry
            .register(
                Blueprint::new("count", vec![Variant::new()]).unwrap(),
                |_ctx: InvocationContext, _m: MatchResult| async {
                    Result::<Response, CommandError>::Ok(Response::active(
                        "0",
                        |message: anvil_framework::ActiveMessage| async move {
                            for i in 1..=100 {
                                message.edit(i.to_string()).await?;
                            }
                            anvil_framework::InteractionResult::Ok(())
                        },
                    ))
                },
            )
            .unwrap();
        let runtime = AnvilRuntime::new(platform.clone(), Dispatcher::new(registry), AnvilConfig::default());
        let (tx, rx) = mpsc::channel(1);
        tx.send(PlatformEvent::Message(message("u1", "m1", "!count")))
            .await
            .unwrap();

        let started = Instant::now();
        runtime
            .run_until(rx, tokio::time::sleep(Duration::from_millis(3500)))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(runtime.driver().interactions().is_empty());
        assert_eq!(
            platform.edits_of(&MessageRef::new("c1", "sent-1")),
            vec!["1".to_string(), "2".to_string(), "3".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_announced_once_before_events() {
        let platform = RecordingPlatform::with_self_id("bot");
        let runtime = runtime(platform.clone());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for name in [ReadyEvent::NAME, "message"] {
            let seen = seen.clone();
            runtime.bus().listen(name, move |event: PlatformEvent| {
                let seen = seen.clone();
                async move { seen.lock().push(event) }
            });
        }

        let (tx, rx) = mpsc::channel(1);
        tx.send(PlatformEvent::Message(message("u1", "m1", "hello")))
            .await
            .unwrap();
        drop(tx);
        runtime.run_until(rx, std::future::pending()).await.unwrap();
        runtime.announce_ready().await;

        let seen = seen.lock();
        let names: Vec<&str> = seen.iter().map(PlatformEvent::name).collect();
        assert_eq!(names, vec!["bot_on_ready_boot", "message"]);
        let ready = ReadyEvent::from_event(&seen[0]).unwrap();
        assert_eq!(ready.self_id, Some(UserId::new("bot")));
        assert_eq!(ready.invoker, "!");
        assert_eq!(ready.commands, vec!["echo".to_string(), "shout".to_string()]);
    }

    #[tokio::test]
    async fn test_dispatch_lifecycle_reaches_runtime_bus() {
        let platform = RecordingPlatform::new();
        let runtime = runtime(platform.clone());
        let pending = runtime
            .bus()
            .prepare_wait(WaitSpec::any(anvil_framework::ResponseEvent::NAME));

        runtime
            .handle_event(PlatformEvent::Message(message("u1", "m1", "!shout hey")))
            .await
            .unwrap();

        let event = pending
            .wait(Duration::from_secs(1), &Default::default())
            .await
            .unwrap();
        let response = anvil_framework::ResponseEvent::from_event(&event).unwrap();
        assert_eq!(response.command, "shout");
        assert_eq!(response.mode, "permanent");
        assert_eq!(response.content, "HEY");
    }

    #[test]
    fn test_build_requires_platform() {
        let result = AnvilRuntime::builder()
            .config(AnvilConfig::default())
            .init_logging(false)
            .build();
        assert!(matches!(result, Err(RuntimeError::MissingPlatform)));
    }

    #[test]
    fn test_build_validates_config() {
        let mut config = AnvilConfig::default();
        config.bot.invoker = String::new();
        let result = AnvilRuntime::builder()
            .config(config)
            .init_logging(false)
            .platform(RecordingPlatform::new())
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }
}
