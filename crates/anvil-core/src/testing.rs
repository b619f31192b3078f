//! An in-memory [`Platform`] for tests.
//!
//! [`RecordingPlatform`] records every call in order and can be told to fail
//! or rate-limit upcoming calls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{Button, ChannelId, MessageRef, Platform, SendOptions, UserId};

/// One recorded platform call.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Send {
        message: MessageRef,
        content: String,
        speak_aloud: bool,
    },
    Edit {
        message: MessageRef,
        content: String,
    },
    Delete(MessageRef),
    AttachControls(MessageRef, Vec<Button>),
    DetachControls(MessageRef),
}

#[derive(Default)]
struct State {
    calls: Vec<PlatformCall>,
    next_id: u64,
    send_failures: VecDeque<PlatformError>,
    edit_failures: VecDeque<PlatformError>,
    delete_failures: VecDeque<PlatformError>,
}

/// A platform that records calls instead of sending anything.
#[derive(Default)]
pub struct RecordingPlatform {
    self_id: Option<UserId>,
    state: Mutex<State>,
}

impl RecordingPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A platform whose bot user is `id`.
    pub fn with_self_id(id: impl Into<UserId>) -> Arc<Self> {
        Arc::new(Self {
            self_id: Some(id.into()),
            state: Mutex::default(),
        })
    }

    /// Makes the next send fail with `error`. Queues in order.
    pub fn fail_next_send(&self, error: PlatformError) {
        self.state.lock().send_failures.push_back(error);
    }

    /// Makes the next edit fail with `error`. Queues in order.
    pub fn fail_next_edit(&self, error: PlatformError) {
        self.state.lock().edit_failures.push_back(error);
    }

    /// Makes the next delete fail with `error`. Queues in order.
    pub fn fail_next_delete(&self, error: PlatformError) {
        self.state.lock().delete_failures.push_back(error);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    /// Contents of every successful edit of `message`, in order.
    pub fn edits_of(&self, message: &MessageRef) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Edit { message: m, content } if m == message => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    /// Contents of every sent message, in order.
    pub fn sent(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Send { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every successfully deleted message, in order.
    pub fn deleted(&self) -> Vec<MessageRef> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Delete(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    fn self_id(&self) -> Option<&UserId> {
        self.self_id.as_ref()
    }

    async fn send(
        &self,
        channel: &ChannelId,
        content: &str,
        options: &SendOptions,
    ) -> PlatformResult<MessageRef> {
        let mut state = self.state.lock();
        if let Some(error) = state.send_failures.pop_front() {
            return Err(error);
        }
        state.next_id += 1;
        let message = MessageRef::new(channel.clone(), format!("sent-{}", state.next_id));
        state.calls.push(PlatformCall::Send {
            message: message.clone(),
            content: content.to_string(),
            speak_aloud: options.speak_aloud,
        });
        Ok(message)
    }

    async fn edit(&self, message: &MessageRef, content: &str) -> PlatformResult<()> {
        let mut state = self.state.lock();
        if let Some(error) = state.edit_failures.pop_front() {
            return Err(error);
        }
        state.calls.push(PlatformCall::Edit {
            message: message.clone(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> PlatformResult<()> {
        let mut state = self.state.lock();
        if let Some(error) = state.delete_failures.pop_front() {
            return Err(error);
        }
        state.calls.push(PlatformCall::Delete(message.clone()));
        Ok(())
    }

    async fn attach_controls(&self, message: &MessageRef, buttons: &[Button]) -> PlatformResult<()> {
        self.state
            .lock()
            .calls
            .push(PlatformCall::AttachControls(message.clone(), buttons.to_vec()));
        Ok(())
    }

    async fn detach_controls(&self, message: &MessageRef) -> PlatformResult<()> {
        self.state
            .lock()
            .calls
            .push(PlatformCall::DetachControls(message.clone()));
        Ok(())
    }
}
