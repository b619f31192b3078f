//! Ownership of outstanding follow-up work, one record per message.
//!
//! [`InteractionRuntime::start`] enforces release-before-acquire: if a
//! follow-up is already pending for the message, it is cancelled and awaited
//! before the new one is spawned, so two tasks never drive the same message
//! at once. Each record carries a generation id; a finishing task only
//! removes the record if it is still its own.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anvil_core::MessageRef;
use parking_lot::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{InteractionError, InteractionResult};

/// Which response mode a pending follow-up belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Active,
    Interactive,
    Wait,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Interactive => write!(f, "interactive"),
            Self::Wait => write!(f, "wait"),
        }
    }
}

struct PendingInteraction {
    kind: InteractionKind,
    started_at: Instant,
    cancel: CancellationToken,
    /// Cancelled once the task has fully released its record.
    finished: CancellationToken,
    generation: u64,
}

#[derive(Default)]
struct Inner {
    pending: RwLock<HashMap<MessageRef, PendingInteraction>>,
    generation: AtomicU64,
    root: CancellationToken,
}

/// Tracks and cancels outstanding ACTIVE, INTERACTIVE and WAIT follow-ups.
#[derive(Clone, Default)]
pub struct InteractionRuntime {
    inner: Arc<Inner>,
}

impl InteractionRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled on [`shutdown`](Self::shutdown), for untracked
    /// timers such as EXPIRE deletions.
    pub fn child_token(&self) -> CancellationToken {
        self.inner.root.child_token()
    }

    /// Starts a follow-up for `message`, replacing any pending one.
    ///
    /// `task` receives the interaction's cancellation token. The returned
    /// future completes once the task has been spawned; the prior follow-up,
    /// if any, has fully finished by then.
    pub async fn start<F, Fut>(&self, message: MessageRef, kind: InteractionKind, task: F) -> FollowUp
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = InteractionResult<()>> + Send + 'static,
    {
        let cancel = self.inner.root.child_token();
        let finished = CancellationToken::new();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let previous = self.inner.pending.write().insert(
            message.clone(),
            PendingInteraction {
                kind,
                started_at: Instant::now(),
                cancel: cancel.clone(),
                finished: finished.clone(),
                generation,
            },
        );
        // Releases the record even if this future is dropped while waiting.
        let guard = ReleaseGuard {
            inner: self.inner.clone(),
            message: message.clone(),
            generation,
            finished: finished.clone(),
        };

        if let Some(previous) = previous {
            debug!(
                message = %message,
                previous = %previous.kind,
                age = ?previous.started_at.elapsed(),
                "Cancelling pending interaction for replacement"
            );
            previous.cancel.cancel();
            previous.finished.cancelled().await;
        }

        debug!(message = %message, kind = %kind, generation, "Starting interaction");
        let future = task(cancel);
        tokio::spawn(async move {
            let _guard = guard;
            match future.await {
                Ok(()) => debug!(kind = %kind, generation, "Interaction finished"),
                Err(InteractionError::Cancelled) => {
                    debug!(kind = %kind, generation, "Interaction cancelled")
                }
                Err(e) => warn!(kind = %kind, generation, error = %e, "Interaction failed"),
            }
        });

        FollowUp { finished }
    }

    /// Requests cancellation of the follow-up pending for `message`.
    ///
    /// Returns `false` if nothing was pending. The record is released by the
    /// task itself once it observes the cancellation.
    pub fn cancel(&self, message: &MessageRef) -> bool {
        match self.inner.pending.read().get(message) {
            Some(pending) => {
                pending.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels the follow-up pending for `message` and waits until it has
    /// released its record.
    ///
    /// Returns `false` if nothing was pending.
    pub async fn cancel_and_wait(&self, message: &MessageRef) -> bool {
        let finished = match self.inner.pending.read().get(message) {
            Some(pending) => {
                pending.cancel.cancel();
                pending.finished.clone()
            }
            None => return false,
        };
        finished.cancelled().await;
        true
    }

    pub fn is_pending(&self, message: &MessageRef) -> bool {
        self.inner.pending.read().contains_key(message)
    }

    pub fn kind_of(&self, message: &MessageRef) -> Option<InteractionKind> {
        self.inner.pending.read().get(message).map(|p| p.kind)
    }

    pub fn len(&self) -> usize {
        self.inner.pending.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.pending.read().is_empty()
    }

    /// Cancels every follow-up and waits for all of them to release.
    pub async fn shutdown(&self) {
        self.inner.root.cancel();
        let finished: Vec<CancellationToken> = self
            .inner
            .pending
            .read()
            .values()
            .map(|p| p.finished.clone())
            .collect();
        debug!(count = finished.len(), "Waiting for interactions to finish");
        futures::future::join_all(finished.iter().map(|f| f.cancelled())).await;
    }
}

struct ReleaseGuard {
    inner: Arc<Inner>,
    message: MessageRef,
    generation: u64,
    finished: CancellationToken,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let mut pending = self.inner.pending.write();
        if pending
            .get(&self.message)
            .is_some_and(|p| p.generation == self.generation)
        {
            pending.remove(&self.message);
        }
        drop(pending);
        self.finished.cancel();
    }
}

/// Completion handle for a spawned follow-up.
#[derive(Debug, Clone)]
pub struct FollowUp {
    finished: CancellationToken,
}

impl FollowUp {
    /// A handle completed when `finished` is cancelled.
    pub(crate) fn new(finished: CancellationToken) -> Self {
        Self { finished }
    }

    /// A handle that is already complete.
    pub fn finished() -> Self {
        let finished = CancellationToken::new();
        finished.cancel();
        Self { finished }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Waits until the follow-up has finished and released its record.
    pub async fn join(self) {
        self.finished.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, assert_ready, task};

    fn message() -> MessageRef {
        MessageRef::new("c1", "m1")
    }

    #[tokio::test]
    async fn test_record_released_after_completion() {
        let runtime = InteractionRuntime::new();
        let follow_up = runtime
            .start(message(), InteractionKind::Active, |_cancel| async { Ok(()) })
            .await;
        follow_up.join().await;

        assert!(!runtime.is_pending(&message()));
        assert!(runtime.is_empty());
    }

    #[tokio::test]
    async fn test_record_released_after_failure() {
        let runtime = InteractionRuntime::new();
        let follow_up = runtime
            .start(message(), InteractionKind::Interactive, |_cancel| async {
                Err(InteractionError::Platform(anvil_core::PlatformError::NotConnected))
            })
            .await;
        follow_up.join().await;
        assert!(runtime.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_record() {
        let runtime = InteractionRuntime::new();
        let follow_up = runtime
            .start(message(), InteractionKind::Wait, |cancel| async move {
                cancel.cancelled().await;
                Err(InteractionError::Cancelled)
            })
            .await;
        assert_eq!(runtime.kind_of(&message()), Some(InteractionKind::Wait));
        let mut join = task::spawn(follow_up.clone().join());
        assert_pending!(join.poll());

        assert!(runtime.cancel(&message()));
        follow_up.join().await;
        assert_ready!(join.poll());
        assert!(!runtime.is_pending(&message()));
        assert!(!runtime.cancel(&message()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_waits_for_prior_task() {
        let runtime = InteractionRuntime::new();
        let (observed_tx, observed_rx) = oneshot::channel();

        let first = runtime
            .start(message(), InteractionKind::Active, |cancel| async move {
                cancel.cancelled().await;
                // Slow teardown after observing the cancellation.
                tokio::time::sleep(Duration::from_millis(500)).await;
                let _ = observed_tx.send(Instant::now());
                Err(InteractionError::Cancelled)
            })
            .await;

        let second = runtime
            .start(message(), InteractionKind::Active, |_cancel| async move {
                Ok(())
            })
            .await;
        let started_second = Instant::now();

        assert!(first.is_finished());
        let first_done = observed_rx.await.unwrap();
        assert!(first_done <= started_second);
        second.join().await;
        assert!(runtime.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_task_does_not_remove_new_record() {
        let runtime = InteractionRuntime::new();
        runtime
            .start(message(), InteractionKind::Active, |cancel| async move {
                cancel.cancelled().await;
                Err(InteractionError::Cancelled)
            })
            .await;
        let second = runtime
            .start(message(), InteractionKind::Wait, |cancel| async move {
                cancel.cancelled().await;
                Err(InteractionError::Cancelled)
            })
            .await;

        tokio::task::yield_now().await;
        assert_eq!(runtime.len(), 1);
        assert_eq!(runtime.kind_of(&message()), Some(InteractionKind::Wait));

        runtime.shutdown().await;
        assert!(second.is_finished());
        assert!(runtime.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_everything() {
        let runtime = InteractionRuntime::new();
        for id in ["a", "b", "c"] {
            runtime
                .start(MessageRef::new("c1", id), InteractionKind::Active, |cancel| async move {
                    cancel.cancelled().await;
                    Err(InteractionError::Cancelled)
                })
                .await;
        }
        assert_eq!(runtime.len(), 3);

        runtime.shutdown().await;
        assert!(runtime.is_empty());
        assert!(runtime.child_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_wait_returns_after_release() {
        let runtime = InteractionRuntime::new();
        let follow_up = runtime
            .start(message(), InteractionKind::Active, |cancel| async move {
                cancel.cancelled().await;
                tokio::time::sleep(Duration::from_millis(300)).await;
                Err(InteractionError::Cancelled)
            })
            .await;
        let start = Instant::now();

        assert!(runtime.cancel_and_wait(&message()).await);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        assert!(follow_up.is_finished());
        assert!(runtime.is_empty());
        assert!(!runtime.cancel_and_wait(&message()).await);
    }

    #[test]
    fn test_finished_handle() {
        assert!(FollowUp::finished().is_finished());
    }
}
