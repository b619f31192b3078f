//! The handle follow-up handlers use to touch their message.
//!
//! An [`ActiveMessage`] is cheap to clone. All clones share one edit slot:
//! edits are serialized, at least the pacing interval apart (counted from
//! when the message was sent), and fail with
//! [`InteractionError::Cancelled`] once the owning interaction has been
//! cancelled. A cancelled interaction never edits its message again.

use std::sync::Arc;
use std::time::Duration;

use anvil_core::{BoxedPlatform, MessageRef};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{InteractionError, InteractionResult};
use crate::retry::RetryPolicy;

struct Inner {
    platform: BoxedPlatform,
    message: MessageRef,
    cancel: CancellationToken,
    pacing: Duration,
    retry: RetryPolicy,
    last_edit: Mutex<Instant>,
}

/// A sent message owned by a running interaction.
#[derive(Clone)]
pub struct ActiveMessage {
    inner: Arc<Inner>,
}

impl ActiveMessage {
    pub fn new(
        platform: BoxedPlatform,
        message: MessageRef,
        cancel: CancellationToken,
        pacing: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                platform,
                message,
                cancel,
                pacing,
                retry,
                last_edit: Mutex::new(Instant::now()),
            }),
        }
    }

    pub fn message(&self) -> &MessageRef {
        &self.inner.message
    }

    pub fn platform(&self) -> &BoxedPlatform {
        &self.inner.platform
    }

    /// Whether the owning interaction has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolves once the owning interaction is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Replaces the message content, waiting out the pacing interval first.
    pub async fn edit(&self, content: impl Into<String>) -> InteractionResult<()> {
        let content = content.into();
        let cancel = &self.inner.cancel;

        let mut last_edit = tokio::select! {
            _ = cancel.cancelled() => return Err(InteractionError::Cancelled),
            guard = self.inner.last_edit.lock() => guard,
        };
        let ready_at = *last_edit + self.inner.pacing;
        tokio::select! {
            _ = cancel.cancelled() => return Err(InteractionError::Cancelled),
            _ = tokio::time::sleep_until(ready_at) => {}
        }

        trace!(message = %self.inner.message, "Editing active message");
        let platform = &self.inner.platform;
        let message = &self.inner.message;
        let result = self
            .inner
            .retry
            .run_cancellable("edit", cancel, || platform.edit(message, &content))
            .await;
        *last_edit = Instant::now();
        result
    }

    /// Sleeps for `duration`, returning early with
    /// [`InteractionError::Cancelled`] if the interaction is cancelled.
    pub async fn sleep(&self, duration: Duration) -> InteractionResult<()> {
        tokio::select! {
            _ = self.inner.cancel.cancelled() => Err(InteractionError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Deletes the message. Works after cancellation.
    pub async fn delete(&self) -> InteractionResult<()> {
        let platform = &self.inner.platform;
        let message = &self.inner.message;
        self.inner
            .retry
            .run("delete", || platform.delete(message))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::PlatformError;
    use anvil_core::testing::RecordingPlatform;

    fn active(platform: Arc<RecordingPlatform>, cancel: CancellationToken) -> ActiveMessage {
        ActiveMessage::new(
            platform,
            MessageRef::new("c1", "sent-1"),
            cancel,
            Duration::from_secs(1),
            RetryPolicy::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_are_paced() {
        let platform = RecordingPlatform::new();
        let message = active(platform.clone(), CancellationToken::new());
        let start = Instant::now();

        message.edit("one").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        message.edit("two").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        assert_eq!(platform.edits_of(message.message()), vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_edit_never_reaches_platform() {
        let platform = RecordingPlatform::new();
        let cancel = CancellationToken::new();
        let message = active(platform.clone(), cancel.clone());

        cancel.cancel();
        let err = message.edit("late").await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(message.is_cancelled());
        assert!(platform.edits_of(message.message()).is_empty());
        assert!(message.sleep(Duration::from_secs(5)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_edit_is_retried() {
        let platform = RecordingPlatform::new();
        platform.fail_next_edit(PlatformError::RateLimited { retry_after: None });
        let message = active(platform.clone(), CancellationToken::new());

        message.edit("eventually").await.unwrap();
        assert_eq!(platform.edits_of(message.message()), vec!["eventually"]);
    }

    #[tokio::test]
    async fn test_delete_after_cancel() {
        let platform = RecordingPlatform::new();
        let cancel = CancellationToken::new();
        let message = active(platform.clone(), cancel.clone());
        cancel.cancel();

        message.delete().await.unwrap();
        assert_eq!(platform.deleted(), vec![message.message().clone()]);
    }
}
