//! Named platform events: persistent listeners and one-shot waits.
//!
//! Events published on the [`EventBus`] go first to every registered waiter
//! whose [`WaitSpec`] accepts them, then to the listeners for that event name
//! in registration order.
//!
//! A one-shot wait is settled exactly once. Publishing removes the waiter from
//! the table under the same lock that hands it the event, so a concurrent
//! timeout either withdraws the waiter first (and sees nothing) or finds it
//! gone and collects the event that was already delivered.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anvil_core::PlatformEvent;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

// =============================================================================
// Predicates and wait specifications
// =============================================================================

/// A filter over events.
pub trait EventPredicate: Send + Sync + 'static {
    fn matches(&self, event: &PlatformEvent) -> bool;
}

impl<F> EventPredicate for F
where
    F: Fn(&PlatformEvent) -> bool + Send + Sync + 'static,
{
    fn matches(&self, event: &PlatformEvent) -> bool {
        self(event)
    }
}

/// What a WAIT response is waiting for.
#[derive(Clone)]
pub struct WaitSpec {
    event: String,
    predicate: Arc<dyn EventPredicate>,
    timeout: Option<Duration>,
}

impl WaitSpec {
    /// Waits for an `event` accepted by `predicate`.
    pub fn new(event: impl Into<String>, predicate: impl EventPredicate) -> Self {
        Self {
            event: event.into(),
            predicate: Arc::new(predicate),
            timeout: None,
        }
    }

    /// Waits for any `event`.
    pub fn any(event: impl Into<String>) -> Self {
        Self::new(event, |_: &PlatformEvent| true)
    }

    /// Overrides the configured default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn matches(&self, event: &PlatformEvent) -> bool {
        event.name() == self.event && self.predicate.matches(event)
    }
}

impl fmt::Debug for WaitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitSpec")
            .field("event", &self.event)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Listeners
// =============================================================================

/// A persistent handler for one event name.
#[async_trait]
pub trait EventListener: Send + Sync + 'static {
    async fn on_event(&self, event: &PlatformEvent);
}

#[async_trait]
impl<F, Fut> EventListener for F
where
    F: Fn(PlatformEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_event(&self, event: &PlatformEvent) {
        self(event.clone()).await
    }
}

// =============================================================================
// Event bus
// =============================================================================

enum Sink {
    Once(oneshot::Sender<PlatformEvent>),
    Stream(mpsc::UnboundedSender<PlatformEvent>),
}

struct Waiter {
    spec: WaitSpec,
    sink: Sink,
}

#[derive(Default)]
struct Inner {
    listeners: RwLock<HashMap<String, Vec<Arc<dyn EventListener>>>>,
    waiters: Mutex<HashMap<u64, Waiter>>,
    next_id: AtomicU64,
}

/// Routes platform events to listeners and waiters.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `event`. Listeners run in registration order.
    pub fn listen(&self, event: impl Into<String>, listener: impl EventListener) {
        let event = event.into();
        debug!(event = %event, "Registering event listener");
        self.inner
            .listeners
            .write()
            .entry(event)
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Number of one-shot waits still outstanding.
    pub fn pending_waits(&self) -> usize {
        self.inner
            .waiters
            .lock()
            .values()
            .filter(|w| matches!(w.sink, Sink::Once(_)))
            .count()
    }

    /// Delivers `event` to matching waiters, then to its listeners.
    pub async fn publish(&self, event: PlatformEvent) {
        let name = event.name().to_string();
        {
            let mut waiters = self.inner.waiters.lock();
            let matched: Vec<u64> = waiters
                .iter()
                .filter(|(_, w)| w.spec.matches(&event))
                .map(|(id, _)| *id)
                .collect();
            for id in matched {
                let keep = match waiters.get(&id).map(|w| &w.sink) {
                    Some(Sink::Stream(tx)) => tx.send(event.clone()).is_ok(),
                    _ => false,
                };
                if keep {
                    continue;
                }
                if let Some(Waiter {
                    sink: Sink::Once(tx),
                    ..
                }) = waiters.remove(&id)
                {
                    trace!(event = %name, waiter = id, "Settling wait");
                    let _ = tx.send(event.clone());
                }
            }
        }

        let listeners = self
            .inner
            .listeners
            .read()
            .get(&name)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener.on_event(&event).await;
        }
    }

    fn register(&self, spec: WaitSpec, sink: Sink) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.waiters.lock().insert(id, Waiter { spec, sink });
        id
    }

    /// Removes a waiter. Returns `false` if it was already settled.
    fn withdraw(&self, id: u64) -> bool {
        self.inner.waiters.lock().remove(&id).is_some()
    }

    /// Registers a one-shot wait now; events published from this point on
    /// can settle it, even before [`PendingWait::wait`] is polled.
    pub fn prepare_wait(&self, spec: WaitSpec) -> PendingWait {
        let timeout = spec.timeout;
        let event = spec.event.clone();
        let (tx, rx) = oneshot::channel();
        let id = self.register(spec, Sink::Once(tx));
        PendingWait {
            bus: self.clone(),
            id,
            event,
            timeout,
            rx,
        }
    }

    /// Waits for the first event accepted by `spec`.
    ///
    /// Returns `None` if the spec's timeout (or `default_timeout`) elapses or
    /// `cancel` fires first.
    pub async fn wait_for(
        &self,
        spec: WaitSpec,
        default_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Option<PlatformEvent> {
        self.prepare_wait(spec).wait(default_timeout, cancel).await
    }

    /// Streams every `event` accepted by `predicate` until the subscription
    /// is dropped.
    pub fn subscribe(&self, event: impl Into<String>, predicate: impl EventPredicate) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.register(WaitSpec::new(event, predicate), Sink::Stream(tx));
        Subscription {
            bus: self.clone(),
            id,
            rx,
        }
    }
}

/// A registered one-shot wait. Withdraws itself if dropped unsettled.
pub struct PendingWait {
    bus: EventBus,
    id: u64,
    event: String,
    timeout: Option<Duration>,
    rx: oneshot::Receiver<PlatformEvent>,
}

impl PendingWait {
    /// Resolves with the matching event, or `None` on timeout or
    /// cancellation.
    pub async fn wait(mut self, default_timeout: Duration, cancel: &CancellationToken) -> Option<PlatformEvent> {
        let timeout = self.timeout.unwrap_or(default_timeout);

        tokio::select! {
            result = &mut self.rx => return result.ok(),
            _ = cancel.cancelled() => {
                debug!(event = %self.event, "Wait cancelled");
                return None;
            }
            _ = tokio::time::sleep(timeout) => {}
        }

        if self.bus.withdraw(self.id) {
            debug!(event = %self.event, timeout = ?timeout, "Wait timed out");
            None
        } else {
            // Settled concurrently with the timeout.
            self.rx.try_recv().ok()
        }
    }
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        self.bus.withdraw(self.id);
    }
}

/// A live stream of matching events. Unregisters itself on drop.
pub struct Subscription {
    bus: EventBus,
    id: u64,
    rx: mpsc::UnboundedReceiver<PlatformEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<PlatformEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.withdraw(self.id);
    }
}
