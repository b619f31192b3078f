//! Command responses and their post-send modes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anvil_core::Button;

use crate::event_bus::WaitSpec;
use crate::handler::{ActiveHandler, InteractiveHandler, WaitHandler};

/// Which messages an EXPIRE response deletes when its timer fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpireTarget {
    /// The message that issued the command.
    Invocation,
    /// The response itself.
    Response,
    /// Both.
    #[default]
    Both,
}

/// How a sent response behaves after delivery.
#[derive(Clone, Default)]
pub enum ResponseMode {
    /// Re-editable if the invoking message is edited.
    #[default]
    Normal,
    /// Never touched again.
    Permanent,
    /// Deleted after a delay.
    Expire { after: Duration, target: ExpireTarget },
    /// Edited over time by a handler.
    Active(Arc<dyn ActiveHandler>),
    /// Reacts to controls attached to the message.
    Interactive {
        buttons: Vec<Button>,
        handler: Arc<dyn InteractiveHandler>,
        /// Inactivity timeout; the configured default when `None`.
        timeout: Option<Duration>,
    },
    /// Waits for one platform event, then calls its handler once.
    Wait {
        spec: WaitSpec,
        handler: Arc<dyn WaitHandler>,
    },
}

impl ResponseMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Permanent => "permanent",
            Self::Expire { .. } => "expire",
            Self::Active(_) => "active",
            Self::Interactive { .. } => "interactive",
            Self::Wait { .. } => "wait",
        }
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Normal)
    }
}

impl fmt::Debug for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expire { after, target } => f
                .debug_struct("Expire")
                .field("after", after)
                .field("target", target)
                .finish(),
            Self::Interactive {
                buttons, timeout, ..
            } => f
                .debug_struct("Interactive")
                .field("buttons", buttons)
                .field("timeout", timeout)
                .finish_non_exhaustive(),
            Self::Wait { spec, .. } => f.debug_struct("Wait").field("spec", spec).finish_non_exhaustive(),
            other => f.write_str(other.name()),
        }
    }
}

/// What a command handler returns: content plus a post-send mode.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub content: String,
    pub mode: ResponseMode,
    /// Ask the platform to read the message aloud.
    pub speak_aloud: bool,
}

impl Response {
    /// A NORMAL response.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn permanent(content: impl Into<String>) -> Self {
        Self::new(content).with_mode(ResponseMode::Permanent)
    }

    /// Deletes the invocation and the response after `after`.
    pub fn expire(content: impl Into<String>, after: Duration) -> Self {
        Self::expire_target(content, after, ExpireTarget::Both)
    }

    pub fn expire_target(content: impl Into<String>, after: Duration, target: ExpireTarget) -> Self {
        Self::new(content).with_mode(ResponseMode::Expire { after, target })
    }

    pub fn active(content: impl Into<String>, handler: impl ActiveHandler) -> Self {
        Self::new(content).with_mode(ResponseMode::Active(Arc::new(handler)))
    }

    pub fn interactive(
        content: impl Into<String>,
        buttons: Vec<Button>,
        handler: impl InteractiveHandler,
    ) -> Self {
        Self::new(content).with_mode(ResponseMode::Interactive {
            buttons,
            handler: Arc::new(handler),
            timeout: None,
        })
    }

    pub fn wait(content: impl Into<String>, spec: WaitSpec, handler: impl WaitHandler) -> Self {
        Self::new(content).with_mode(ResponseMode::Wait {
            spec,
            handler: Arc::new(handler),
        })
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the inactivity timeout of an interactive response. No effect on
    /// other modes.
    pub fn interaction_timeout(mut self, after: Duration) -> Self {
        if let ResponseMode::Interactive { timeout, .. } = &mut self.mode {
            *timeout = Some(after);
        }
        self
    }

    pub fn speak_aloud(mut self) -> Self {
        self.speak_aloud = true;
        self
    }
}
